//! Synthetic `map -> odom -> base_link` scene with a lidar cloud and a few markers.

use std::f64::consts::TAU;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::messages::{
    ColorRgba, Header, Marker, MarkerArray, MarkerType, Message, PointCloud2, PointField,
    PointFieldType, Quaternion, TfMessage, TopicMessage, TransformData, TransformStamped, Vector3,
};
use crate::renderer::MessageSender;
use crate::time::{self, Time, NANOS_PER_SEC};

pub const TF_TOPIC: &str = "/tf";
pub const CLOUD_TOPIC: &str = "/lidar/points";
pub const MARKER_TOPIC: &str = "/markers";

const LIDAR_POINTS: usize = 720;
const ORBIT_RADIUS: f64 = 4.0;
const ORBIT_PERIOD: f64 = 30.0;
/// Transforms are published slightly ahead so clouds stamped "now" interpolate.
const TF_LEAD: Time = NANOS_PER_SEC / 10;

fn header(stamp: Time, frame_id: &str) -> Header {
    Header {
        stamp,
        frame_id: frame_id.to_string(),
    }
}

fn yaw_quaternion(yaw: f64) -> Quaternion {
    Quaternion {
        x: 0.0,
        y: 0.0,
        z: (yaw / 2.0).sin(),
        w: (yaw / 2.0).cos(),
    }
}

fn transform(
    stamp: Time,
    parent: &str,
    child: &str,
    translation: Vector3,
    yaw: f64,
) -> TransformStamped {
    TransformStamped {
        header: header(stamp, parent),
        child_frame_id: child.to_string(),
        transform: TransformData {
            translation,
            rotation: yaw_quaternion(yaw),
        },
    }
}

/// Robot position in `odom` and its heading.
fn robot_pose(secs: f64) -> (Vector3, f64) {
    let angle = TAU * secs / ORBIT_PERIOD;
    let position = Vector3 {
        x: ORBIT_RADIUS * angle.cos(),
        y: ORBIT_RADIUS * angle.sin(),
        z: 0.0,
    };
    (position, angle + TAU / 4.0)
}

pub fn transforms(stamp: Time) -> TfMessage {
    let (position, heading) = robot_pose(time::to_secs_f64(stamp));
    TfMessage {
        transforms: vec![
            transform(stamp, "map", "odom", Vector3 { x: 1.0, y: -0.5, z: 0.0 }, 0.1),
            transform(stamp, "odom", "base_link", position, heading),
            transform(stamp, "base_link", "lidar", Vector3 { x: 0.2, y: 0.0, z: 0.6 }, 0.0),
        ],
    }
}

/// A wavy ring around the sensor with an intensity field.
pub fn lidar_cloud(stamp: Time) -> PointCloud2 {
    let secs = time::to_secs_f64(stamp);
    let mut data = Vec::with_capacity(LIDAR_POINTS * 16);
    for i in 0..LIDAR_POINTS {
        let angle = TAU * i as f64 / LIDAR_POINTS as f64;
        let range = 6.0 + 1.5 * (angle * 5.0 + secs).sin();
        let point = [
            (range * angle.cos()) as f32,
            (range * angle.sin()) as f32,
            (0.3 * (angle * 3.0).cos()) as f32,
            range as f32,
        ];
        for value in point {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    PointCloud2 {
        header: header(stamp, "lidar"),
        height: 1,
        width: LIDAR_POINTS as u32,
        fields: vec![
            PointField::new("x", 0, PointFieldType::Float32),
            PointField::new("y", 4, PointFieldType::Float32),
            PointField::new("z", 8, PointFieldType::Float32),
            PointField::new("intensity", 12, PointFieldType::Float32),
        ],
        is_bigendian: false,
        point_step: 16,
        row_step: 16 * LIDAR_POINTS as u32,
        data,
    }
}

pub fn markers(stamp: Time) -> MarkerArray {
    let mut body = Marker::new(header(stamp, "base_link"), "robot", 0, MarkerType::Cube);
    body.scale = Vector3 { x: 0.8, y: 0.5, z: 0.3 };
    body.pose.position.z = 0.15;
    body.color = ColorRgba::new(0.2, 0.6, 1.0, 1.0);
    body.frame_locked = true;

    let mut heading = Marker::new(header(stamp, "base_link"), "robot", 1, MarkerType::Arrow);
    heading.scale = Vector3 { x: 1.2, y: 0.1, z: 0.15 };
    heading.pose.position.z = 0.4;
    heading.color = ColorRgba::new(1.0, 0.8, 0.1, 1.0);
    heading.frame_locked = true;

    let path: Vec<Vector3> = (0..=64)
        .map(|i| {
            let angle = TAU * i as f64 / 64.0;
            Vector3 {
                x: ORBIT_RADIUS * angle.cos(),
                y: ORBIT_RADIUS * angle.sin(),
                z: 0.0,
            }
        })
        .collect();
    let mut orbit = Marker::new(header(0, "odom"), "path", 0, MarkerType::LineStrip);
    orbit.color = ColorRgba::new(0.6, 0.6, 0.6, 1.0);
    orbit.points = path;
    orbit.frame_locked = true;

    let mut waypoints = Marker::new(header(0, "map"), "path", 1, MarkerType::SphereList);
    waypoints.scale = Vector3 { x: 0.3, y: 0.3, z: 0.3 };
    waypoints.points = (0..4)
        .map(|i| {
            let angle = TAU * i as f64 / 4.0;
            Vector3 {
                x: 8.0 * angle.cos(),
                y: 8.0 * angle.sin(),
                z: 0.5,
            }
        })
        .collect();
    waypoints.colors = vec![
        ColorRgba::new(1.0, 0.2, 0.2, 1.0),
        ColorRgba::new(0.2, 1.0, 0.2, 1.0),
        ColorRgba::new(0.2, 0.2, 1.0, 1.0),
        ColorRgba::new(1.0, 1.0, 1.0, 0.5),
    ];
    waypoints.frame_locked = true;

    MarkerArray {
        markers: vec![body, heading, orbit, waypoints],
    }
}

/// Every message the demo publishes for playback time `stamp`.
pub fn scene_at(stamp: Time) -> Vec<TopicMessage> {
    let message = |topic: &str, message| TopicMessage {
        topic: topic.to_string(),
        receive_time: stamp,
        message,
    };
    vec![
        message(TF_TOPIC, Message::Tf(transforms(stamp + TF_LEAD))),
        message(CLOUD_TOPIC, Message::PointCloud(lidar_cloud(stamp))),
        message(MARKER_TOPIC, Message::MarkerArray(markers(stamp))),
    ]
}

/// Publishes the scene at `rate_hz` until the receiving renderer goes away.
pub fn spawn(sender: MessageSender, rate_hz: f64) -> JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(1.0));
    thread::spawn(move || {
        let start = Instant::now();
        let mut next = start;
        loop {
            let stamp = time::from_secs_f64(start.elapsed().as_secs_f64());
            for message in scene_at(stamp) {
                if !sender.send(message) {
                    log::debug!("demo publisher stopped");
                    return;
                }
            }
            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud;

    #[test]
    fn test_cloud_is_valid() {
        let cloud = lidar_cloud(NANOS_PER_SEC);
        assert!(point_cloud::validate(&cloud).is_ok());
        assert_eq!(cloud.point_count(), LIDAR_POINTS);
    }

    #[test]
    fn test_markers_are_valid() {
        for marker in markers(0).markers {
            assert!(crate::markers::validate(&marker).is_ok(), "{:?}", marker.marker_type);
        }
    }
}
