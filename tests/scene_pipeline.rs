use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use glam::{DVec3, Vec3};

use tf_scene::messages::{
    Header, Marker, MarkerAction, MarkerArray, MarkerType, Message, PointCloud2, PointField,
    PointFieldType, TfMessage, TopicMessage, TransformData, TransformStamped, Vector3,
};
use tf_scene::renderer::{HeadlessBackend, Renderer, Topology};
use tf_scene::time::{Time, NANOS_PER_SEC};
use tf_scene::{ErrorKind, FrameInfo, FrameObserver, LookupQuality, RendererConfig, TickOutcome};

const SEC: Time = NANOS_PER_SEC;

fn tf(child: &str, parent: &str, stamp: Time, translation: [f64; 3]) -> TopicMessage {
    TopicMessage {
        topic: "/tf".to_string(),
        receive_time: stamp,
        message: Message::Tf(TfMessage {
            transforms: vec![TransformStamped {
                header: Header {
                    stamp,
                    frame_id: parent.to_string(),
                },
                child_frame_id: child.to_string(),
                transform: TransformData {
                    translation: Vector3 {
                        x: translation[0],
                        y: translation[1],
                        z: translation[2],
                    },
                    ..TransformData::default()
                },
            }],
        }),
    }
}

fn cloud(topic: &str, frame_id: &str, stamp: Time, points: &[[f32; 3]]) -> TopicMessage {
    let data = points
        .iter()
        .flat_map(|p| p.iter().flat_map(|c| c.to_le_bytes()))
        .collect();
    TopicMessage {
        topic: topic.to_string(),
        receive_time: stamp,
        message: Message::PointCloud(PointCloud2 {
            header: Header {
                stamp,
                frame_id: frame_id.to_string(),
            },
            height: 1,
            width: points.len() as u32,
            fields: vec![
                PointField::new("x", 0, PointFieldType::Float32),
                PointField::new("y", 4, PointFieldType::Float32),
                PointField::new("z", 8, PointFieldType::Float32),
            ],
            is_bigendian: false,
            point_step: 12,
            row_step: 12 * points.len() as u32,
            data,
        }),
    }
}

fn marker_message(markers: Vec<Marker>, receive_time: Time) -> TopicMessage {
    TopicMessage {
        topic: "/markers".to_string(),
        receive_time,
        message: Message::MarkerArray(MarkerArray { markers }),
    }
}

/// `map -> odom -> base_link` with samples at t=0 and t=10s.
fn robot_renderer() -> Renderer<HeadlessBackend> {
    let mut renderer = Renderer::new(RendererConfig::default(), HeadlessBackend::new());
    renderer.add_message(tf("odom", "map", 0, [1.0, 0.0, 0.0]));
    renderer.add_message(tf("odom", "map", 10 * SEC, [3.0, 0.0, 0.0]));
    renderer.add_message(tf("base_link", "odom", 0, [0.0, 0.0, 0.0]));
    renderer.add_message(tf("base_link", "odom", 10 * SEC, [0.0, 2.0, 0.0]));
    renderer
}

#[test]
fn test_base_link_in_map_halfway() {
    let mut renderer = robot_renderer();

    let resolved = renderer.tree().lookup("base_link", "map", 5 * SEC).unwrap();
    assert_eq!(resolved.quality, LookupQuality::Interpolated);
    assert!(resolved.pose.translation.abs_diff_eq(DVec3::new(2.0, 1.0, 0.0), 1e-9));

    let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
    renderer.add_message(cloud("/cloud", "base_link", 5 * SEC, &points));
    assert_eq!(renderer.tick(5 * SEC).unwrap(), TickOutcome::Continue);
    assert_eq!(renderer.fixed_frame(), Some("map"));

    let frame = renderer.backend().last_frame().unwrap();
    let item = frame.items_for("/cloud").next().unwrap();
    assert_eq!(item.topology, Topology::Points);
    assert_eq!(item.element_count, 2);
    let origin = item.model.transform_point3(Vec3::ZERO);
    assert_relative_eq!(origin.x, 2.0, epsilon = 1e-6);
    assert_relative_eq!(origin.y, 1.0, epsilon = 1e-6);
    assert!(renderer.errors().is_empty());
}

#[test]
fn test_missing_then_stale_transform_diagnostics() {
    let mut renderer = robot_renderer();
    renderer.add_message(cloud("/cloud", "lidar", 5 * SEC, &[[1.0, 2.0, 3.0]]));
    renderer.tick(5 * SEC).unwrap();
    assert!(renderer.errors().has("/cloud", ErrorKind::MissingTransform));
    let frame = renderer.backend().last_frame().unwrap();
    assert_eq!(frame.items_for("/cloud").count(), 0);

    renderer.add_message(tf("lidar", "base_link", 0, [0.0, 0.0, 1.0]));
    renderer.add_message(tf("lidar", "base_link", 10 * SEC, [0.0, 0.0, 1.0]));
    renderer.tick(5 * SEC).unwrap();
    assert!(!renderer.errors().has("/cloud", ErrorKind::MissingTransform));
    assert_eq!(renderer.backend().last_frame().unwrap().items_for("/cloud").count(), 1);

    // stamped after every known sample: clamped, still drawn
    renderer.add_message(cloud("/cloud", "lidar", 20 * SEC, &[[1.0, 2.0, 3.0]]));
    renderer.tick(20 * SEC).unwrap();
    assert!(renderer.errors().has("/cloud", ErrorKind::StaleTransform));
    assert_eq!(renderer.backend().last_frame().unwrap().items_for("/cloud").count(), 1);
}

#[test]
fn test_equal_counts_reuse_buffers_across_ticks() {
    let mut renderer = robot_renderer();
    renderer.add_message(cloud("/cloud", "base_link", SEC, &[[0.0; 3], [1.0; 3]]));
    renderer.tick(SEC).unwrap();
    let first = renderer.point_clouds().get("/cloud").unwrap().latest().unwrap().positions().id();
    let uploads = renderer.backend().uploads();

    renderer.add_message(cloud("/cloud", "base_link", 2 * SEC, &[[2.0; 3], [3.0; 3]]));
    renderer.tick(2 * SEC).unwrap();
    let second = renderer.point_clouds().get("/cloud").unwrap().latest().unwrap().positions().id();
    assert_eq!(first, second);
    // positions and colors rewritten in place
    assert_eq!(renderer.backend().uploads(), uploads + 2);
    assert!(renderer.backend().released().is_empty());

    renderer.add_message(cloud("/cloud", "base_link", 3 * SEC, &[[2.0; 3]; 3]));
    renderer.tick(3 * SEC).unwrap();
    let third = renderer.point_clouds().get("/cloud").unwrap().latest().unwrap().positions().id();
    assert_ne!(first, third);
    assert!(renderer.backend().released().contains(&first));
    assert!(!renderer.backend().is_live(first));
}

#[test]
fn test_markers_flow_through_sender() {
    let mut renderer = robot_renderer();
    let sender = renderer.sender();

    let header = Header {
        stamp: 5 * SEC,
        frame_id: "base_link".to_string(),
    };
    let cube = Marker::new(header.clone(), "robot", 0, MarkerType::Cube);
    let mut path = Marker::new(header.clone(), "robot", 1, MarkerType::LineStrip);
    path.points = vec![Vector3::default(); 4];
    let text = Marker::new(header.clone(), "robot", 2, MarkerType::TextViewFacing);
    assert!(sender.send(marker_message(vec![cube, path, text], 5 * SEC)));

    renderer.tick(5 * SEC).unwrap();
    assert_eq!(renderer.markers().topic_len("/markers"), 2);
    assert!(renderer.errors().has("/markers", ErrorKind::InvalidMarker));
    let frame = renderer.backend().last_frame().unwrap();
    let topologies: Vec<Topology> = frame.items_for("/markers").map(|item| item.topology).collect();
    assert_eq!(topologies.len(), 2);
    assert!(topologies.contains(&Topology::Triangles));
    assert!(topologies.contains(&Topology::Lines));

    let mut delete_all = Marker::new(header, "", 0, MarkerType::Cube);
    delete_all.action = MarkerAction::DeleteAll;
    assert!(sender.send(marker_message(vec![delete_all], 6 * SEC)));
    renderer.tick(6 * SEC).unwrap();
    assert!(renderer.markers().is_empty());
    assert!(!renderer.errors().has("/markers", ErrorKind::InvalidMarker));
    assert_eq!(renderer.backend().last_frame().unwrap().items_for("/markers").count(), 0);
}

#[test]
fn test_deleted_markers_clear_transform_diagnostics() {
    let mut renderer = robot_renderer();
    let header = Header {
        stamp: SEC,
        frame_id: "nowhere".to_string(),
    };
    let cube = Marker::new(header.clone(), "lost", 0, MarkerType::Cube);
    renderer.add_message(marker_message(vec![cube.clone()], SEC));
    renderer.tick(SEC).unwrap();
    assert!(renderer.errors().has("/markers", ErrorKind::MissingTransform));

    let mut delete = cube.clone();
    delete.action = MarkerAction::Delete;
    renderer.add_message(marker_message(vec![delete], 2 * SEC));
    renderer.tick(2 * SEC).unwrap();
    assert!(renderer.markers().is_empty());
    assert_eq!(renderer.errors().errors_for_topic("/markers").count(), 0);

    renderer.add_message(marker_message(vec![cube], 3 * SEC));
    renderer.tick(3 * SEC).unwrap();
    assert!(renderer.errors().has("/markers", ErrorKind::MissingTransform));

    let mut delete_all = Marker::new(header, "", 0, MarkerType::Cube);
    delete_all.action = MarkerAction::DeleteAll;
    renderer.add_message(marker_message(vec![delete_all], 4 * SEC));
    renderer.tick(4 * SEC).unwrap();
    renderer.tick(5 * SEC).unwrap();
    assert!(renderer.markers().is_empty());
    assert!(!renderer.errors().has("/markers", ErrorKind::MissingTransform));
}

#[test]
fn test_remove_topic_and_dispose_release_everything() {
    let mut renderer = robot_renderer();
    renderer.add_message(cloud("/cloud", "base_link", SEC, &[[1.0; 3]]));
    renderer.add_message(cloud("/other", "missing_frame", SEC, &[[1.0; 3]]));
    renderer.add_message(marker_message(
        vec![Marker::new(
            Header {
                stamp: SEC,
                frame_id: "odom".to_string(),
            },
            "shapes",
            0,
            MarkerType::Sphere,
        )],
        SEC,
    ));
    renderer.tick(SEC).unwrap();
    assert!(renderer.errors().has("/other", ErrorKind::MissingTransform));

    renderer.remove_topic("/other");
    assert!(renderer.point_clouds().get("/other").is_none());
    assert!(!renderer.errors().has("/other", ErrorKind::MissingTransform));

    renderer.dispose();
    assert!(renderer.resources().is_drained());
    assert_eq!(renderer.backend().live_buffers(), 0);
    assert_eq!(renderer.tick(2 * SEC).unwrap(), TickOutcome::Stopped);
}

struct FrameLog(Rc<RefCell<Vec<FrameInfo>>>);

impl FrameObserver for FrameLog {
    fn end_frame(&mut self, frame: &FrameInfo) {
        self.0.borrow_mut().push(frame.clone());
    }
}

#[test]
fn test_observers_see_each_frame() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = robot_renderer();
    renderer.add_observer(Box::new(FrameLog(log.clone())));
    renderer.add_message(cloud("/cloud", "base_link", SEC, &[[1.0; 3]]));

    renderer.tick(SEC).unwrap();
    renderer.tick(2 * SEC).unwrap();

    let frames = log.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].time, 2 * SEC);
    assert_eq!(frames[1].fixed_frame.as_deref(), Some("map"));
    assert_eq!(frames[1].draw_count, 1);
}

#[test]
fn test_bundled_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/viewer.json");
    let config = RendererConfig::from_path(path).unwrap();
    assert_eq!(config.fixed_frame.as_deref(), Some("map"));
    assert_eq!(config.point_cloud_settings("/lidar/points").max_snapshots, 32);
}
