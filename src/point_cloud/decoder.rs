use crate::color::{ChannelOrder, ColorMapper, ColorMode, LinearRgba};
use crate::error::{PointCloudError, PointCloudResult};
use crate::messages::{PointCloud2, PointField, PointFieldType};

/// Decodes one typed little-endian value at a fixed offset within a point record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldReader {
    offset: usize,
    datatype: PointFieldType,
}

impl FieldReader {
    fn bind(field: &PointField, point_step: u32) -> PointCloudResult<Self> {
        let end = field.offset as usize + field.datatype.size();
        if end > point_step as usize {
            return Err(PointCloudError::FieldOutOfBounds {
                name: field.name.clone(),
                offset: field.offset,
                point_step,
            });
        }
        Ok(Self {
            offset: field.offset as usize,
            datatype: field.datatype,
        })
    }

    fn bytes<const N: usize>(&self, point: &[u8]) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&point[self.offset..self.offset + N]);
        out
    }

    pub fn read(&self, point: &[u8]) -> f64 {
        match self.datatype {
            PointFieldType::Int8 => i8::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Uint8 => u8::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Int16 => i16::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Uint16 => u16::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Int32 => i32::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Uint32 => u32::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Float32 => f32::from_le_bytes(self.bytes(point)) as f64,
            PointFieldType::Float64 => f64::from_le_bytes(self.bytes(point)),
        }
    }

    /// Raw bits of a 4 byte field, used for packed colors stored as float or integer.
    pub fn read_bits(&self, point: &[u8]) -> u32 {
        u32::from_le_bytes(self.bytes(point))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AxisReader {
    Field(FieldReader),
    Zero,
}

impl AxisReader {
    fn read(&self, point: &[u8]) -> f32 {
        match self {
            AxisReader::Field(reader) => reader.read(point) as f32,
            AxisReader::Zero => 0.0,
        }
    }
}

/// Which field feeds the color converter and how.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorSelection {
    /// `None` only for flat coloring.
    pub field: Option<String>,
    pub mode: ColorMode,
    pub order: ChannelOrder,
}

impl ColorSelection {
    pub fn flat() -> Self {
        Self {
            field: None,
            mode: ColorMode::Flat,
            order: ChannelOrder::Rgb,
        }
    }

    /// Selection for a named field: composite color names unpack, anything else maps
    /// through the turbo gradient.
    pub fn for_field(name: &str) -> Self {
        match ChannelOrder::from_field_name(name) {
            Some(order) => Self {
                field: Some(name.to_string()),
                mode: if order.has_alpha() {
                    ColorMode::Rgba
                } else {
                    ColorMode::Rgb
                },
                order,
            },
            None => Self {
                field: Some(name.to_string()),
                mode: ColorMode::Turbo,
                order: ChannelOrder::Rgb,
            },
        }
    }

    /// Picks a composite color field, then an intensity field, then the first field.
    pub fn auto_select(fields: &[PointField]) -> Option<Self> {
        let composite = fields
            .iter()
            .find(|f| ChannelOrder::from_field_name(&f.name).is_some());
        let intensity = || fields.iter().find(|f| f.name == "intensity" || f.name == "i");
        composite
            .or_else(intensity)
            .or_else(|| fields.first())
            .map(|f| Self::for_field(&f.name))
    }
}

pub fn validate(msg: &PointCloud2) -> PointCloudResult<()> {
    if msg.is_bigendian {
        return Err(PointCloudError::BigEndian);
    }
    if msg.point_step == 0 || msg.data.len() % msg.point_step as usize != 0 {
        return Err(PointCloudError::InvalidPointStep {
            len: msg.data.len(),
            point_step: msg.point_step,
        });
    }
    if msg.fields.is_empty() {
        return Err(PointCloudError::NoFields);
    }
    let required = msg.height as usize * msg.row_step as usize;
    if msg.data.len() < required {
        return Err(PointCloudError::DataTooShort {
            len: msg.data.len(),
            required,
        });
    }
    let row_bytes = msg.width as usize * msg.point_step as usize;
    if row_bytes > msg.row_step as usize {
        return Err(PointCloudError::RowTooShort {
            required: row_bytes,
            row_step: msg.row_step,
        });
    }
    Ok(())
}

/// A validated cloud with readers bound for the axes and the selected color field.
#[derive(Debug)]
pub struct BoundCloud<'a> {
    msg: &'a PointCloud2,
    axes: [AxisReader; 3],
    color: Option<FieldReader>,
}

impl<'a> BoundCloud<'a> {
    pub fn bind(msg: &'a PointCloud2, selection: &ColorSelection) -> PointCloudResult<Self> {
        validate(msg)?;

        let find = |name: &str| msg.fields.iter().find(|f| f.name == name);
        let mut axes = [AxisReader::Zero; 3];
        let mut present = 0;
        for (axis, name) in axes.iter_mut().zip(["x", "y", "z"]) {
            if let Some(field) = find(name) {
                *axis = AxisReader::Field(FieldReader::bind(field, msg.point_step)?);
                present += 1;
            }
        }
        if present < 2 {
            return Err(PointCloudError::MissingAxes);
        }

        let color = match &selection.field {
            Some(name) if selection.mode != ColorMode::Flat => {
                let field =
                    find(name).ok_or_else(|| PointCloudError::ColorFieldNotFound(name.clone()))?;
                if selection.mode.is_packed() && field.datatype.size() != 4 {
                    return Err(PointCloudError::InvalidPackedColor(name.clone()));
                }
                Some(FieldReader::bind(field, msg.point_step)?)
            }
            _ => None,
        };

        Ok(Self { msg, axes, color })
    }

    pub fn point_count(&self) -> usize {
        self.msg.point_count()
    }

    /// Point records in row-major order.
    pub fn points(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let msg = self.msg;
        let point_step = msg.point_step as usize;
        let row_step = msg.row_step as usize;
        (0..msg.height as usize).flat_map(move |row| {
            (0..msg.width as usize).map(move |col| {
                let start = row * row_step + col * point_step;
                &msg.data[start..start + point_step]
            })
        })
    }

    /// Min and max of the color field, skipping NaN. `None` without a color field or
    /// without any comparable value.
    pub fn color_range(&self) -> Option<(f64, f64)> {
        let reader = self.color?;
        self.points()
            .map(|p| reader.read(p))
            .filter(|v| !v.is_nan())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((min, max)) => Some((f64::min(min, v), f64::max(max, v))),
            })
    }

    /// Fills `positions` and `colors`, both exactly `point_count` long.
    pub fn populate(
        &self,
        mapper: &ColorMapper,
        positions: &mut [[f32; 3]],
        colors: &mut [LinearRgba],
    ) {
        let packed = matches!(mapper, ColorMapper::Packed { .. });
        let points = positions.iter_mut().zip(colors.iter_mut()).zip(self.points());
        for ((position, color), point) in points {
            *position = [
                self.axes[0].read(point),
                self.axes[1].read(point),
                self.axes[2].read(point),
            ];
            *color = match self.color {
                Some(reader) if packed => mapper.map_packed(reader.read_bits(point)),
                Some(reader) => mapper.map_value(reader.read(point)),
                None => mapper.map_value(0.0),
            };
        }
    }
}
