//! UPCD binary point cloud format
//!
//! A UPCD file is a fixed little-endian header followed by packed points:
//!
//! | field | type |
//! |---|---|
//! | magic | `b"UPCD"` |
//! | version | `u16` (1) |
//! | coordinate space | `u8`, 0 = sensor-local, 1 = world |
//! | has colour | `u8`, 0 or 1 |
//! | point count | `u32` |
//! | world transform | 16 × `f32`, row-major 4×4 |
//!
//! Each point is `f32 x, y, z`, followed by `u8 r, g, b` when the file is coloured.

use crate::error::IoError;
use nalgebra::Matrix4;
use somagrid_core::{ColoredPoint3f, ColoredPointCloud3f, Point3f, Result, DEFAULT_COLOR};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const UPCD_MAGIC: [u8; 4] = *b"UPCD";
pub const UPCD_VERSION: u16 = 1;

/// Upper bound on the up-front allocation for a declared point count
const MAX_PREALLOCATED_POINTS: usize = 1 << 22;

/// Frame the stored positions are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Sensor-local; the header transform maps to world
    Local,
    World,
}

impl CoordinateSpace {
    fn from_byte(byte: u8) -> std::result::Result<Self, IoError> {
        match byte {
            0 => Ok(CoordinateSpace::Local),
            1 => Ok(CoordinateSpace::World),
            other => Err(IoError::ParseError {
                message: format!("unknown UPCD coordinate space {}", other),
            }),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            CoordinateSpace::Local => 0,
            CoordinateSpace::World => 1,
        }
    }
}

/// UPCD header information
#[derive(Debug, Clone, PartialEq)]
pub struct UpcdHeader {
    pub version: u16,
    pub coordinate_space: CoordinateSpace,
    pub has_color: bool,
    pub point_count: u32,
    pub transform: Matrix4<f32>,
}

impl UpcdHeader {
    /// Size of the encoded header in bytes
    pub const ENCODED_LEN: usize = 4 + 2 + 1 + 1 + 4 + 16 * 4;

    /// Bytes per encoded point
    pub fn point_stride(&self) -> usize {
        if self.has_color {
            15
        } else {
            12
        }
    }
}

/// Options applied while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcdReadOptions {
    /// Map local-space files into world space with the stored transform
    pub apply_transform: bool,
    /// Keep every `stride`-th point; 0 and 1 keep all
    pub stride: usize,
}

impl Default for UpcdReadOptions {
    fn default() -> Self {
        Self {
            apply_transform: true,
            stride: 1,
        }
    }
}

/// Options applied while writing
#[derive(Debug, Clone, PartialEq)]
pub struct UpcdWriteOptions {
    pub coordinate_space: CoordinateSpace,
    /// Write the colour channel
    pub include_colors: bool,
    pub transform: Matrix4<f32>,
}

impl Default for UpcdWriteOptions {
    fn default() -> Self {
        Self {
            coordinate_space: CoordinateSpace::World,
            include_colors: true,
            transform: Matrix4::identity(),
        }
    }
}

/// A loaded UPCD file
#[derive(Debug, Clone)]
pub struct UpcdCloud {
    pub header: UpcdHeader,
    /// Coordinate space of `cloud` after loading
    pub coordinate_space: CoordinateSpace,
    pub cloud: ColoredPointCloud3f,
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> std::io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_f32<R: Read>(reader: &mut R) -> std::io::Result<f32> {
    Ok(f32::from_le_bytes(read_array(reader)?))
}

/// Apply the affine part of a homogeneous transform; the bottom row is ignored
pub fn transform_point(transform: &Matrix4<f32>, p: &Point3f) -> Point3f {
    Point3f::from(transform.fixed_view::<3, 4>(0, 0) * p.to_homogeneous())
}

/// UPCD reader
pub struct UpcdReader;

impl UpcdReader {
    /// Read a UPCD file
    pub fn read_file<P: AsRef<Path>>(path: P, options: &UpcdReadOptions) -> Result<UpcdCloud> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let loaded = Self::read_from(&mut reader, options)?;
        log::debug!(
            "loaded {} points from {} (colors={}, space={:?})",
            loaded.cloud.len(),
            path.display(),
            loaded.header.has_color,
            loaded.coordinate_space
        );
        Ok(loaded)
    }

    /// Read UPCD data from a reader
    pub fn read_from<R: Read>(reader: &mut R, options: &UpcdReadOptions) -> Result<UpcdCloud> {
        let header = Self::read_header(reader)?;
        let mut cloud = Self::read_points(reader, &header)?;

        let mut coordinate_space = header.coordinate_space;
        if options.apply_transform && coordinate_space == CoordinateSpace::Local {
            for point in cloud.iter_mut() {
                point.position = transform_point(&header.transform, &point.position);
            }
            coordinate_space = CoordinateSpace::World;
        }

        Ok(UpcdCloud {
            header,
            coordinate_space,
            cloud: cloud.stride(options.stride),
        })
    }

    /// Read and validate the fixed header
    pub fn read_header<R: Read>(reader: &mut R) -> Result<UpcdHeader> {
        let magic: [u8; 4] = read_array(reader)?;
        if magic != UPCD_MAGIC {
            return Err(IoError::InvalidFormat {
                format: format!("bad UPCD magic {:?}", magic),
            }
            .into());
        }

        let version = u16::from_le_bytes(read_array(reader)?);
        if version != UPCD_VERSION {
            return Err(IoError::InvalidFormat {
                format: format!("unsupported UPCD version {}", version),
            }
            .into());
        }

        let [space, color]: [u8; 2] = read_array(reader)?;
        let coordinate_space = CoordinateSpace::from_byte(space)?;
        let has_color = match color {
            0 => false,
            1 => true,
            other => {
                return Err(IoError::ParseError {
                    message: format!("invalid UPCD color flag {}", other),
                }
                .into())
            }
        };

        let point_count = u32::from_le_bytes(read_array(reader)?);

        let mut values = [0.0f32; 16];
        for v in values.iter_mut() {
            *v = read_f32(reader)?;
        }

        Ok(UpcdHeader {
            version,
            coordinate_space,
            has_color,
            point_count,
            transform: Matrix4::from_row_slice(&values),
        })
    }

    fn read_points<R: Read>(reader: &mut R, header: &UpcdHeader) -> Result<ColoredPointCloud3f> {
        let count = header.point_count as usize;
        let mut cloud = ColoredPointCloud3f::with_capacity(count.min(MAX_PREALLOCATED_POINTS));

        for i in 0..count {
            let position = Self::read_position(reader).map_err(|e| truncated(e, i, count))?;
            let color = if header.has_color {
                read_array::<_, 3>(reader).map_err(|e| truncated(e, i, count))?
            } else {
                DEFAULT_COLOR
            };
            cloud.push(ColoredPoint3f::new(position, color));
        }

        Ok(cloud)
    }

    fn read_position<R: Read>(reader: &mut R) -> std::io::Result<Point3f> {
        let x = read_f32(reader)?;
        let y = read_f32(reader)?;
        let z = read_f32(reader)?;
        Ok(Point3f::new(x, y, z))
    }
}

fn truncated(err: std::io::Error, index: usize, count: usize) -> somagrid_core::Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        IoError::ParseError {
            message: format!("UPCD data truncated at point {} of {}", index, count),
        }
        .into()
    } else {
        err.into()
    }
}

/// UPCD writer
pub struct UpcdWriter;

impl UpcdWriter {
    /// Write a cloud to a UPCD file
    pub fn write_file<P: AsRef<Path>>(
        cloud: &ColoredPointCloud3f,
        path: P,
        options: &UpcdWriteOptions,
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(cloud, &mut writer, options)?;
        writer.flush()?;
        Ok(())
    }

    /// Write a cloud to any writer
    pub fn write_to<W: Write>(
        cloud: &ColoredPointCloud3f,
        writer: &mut W,
        options: &UpcdWriteOptions,
    ) -> Result<()> {
        let point_count = u32::try_from(cloud.len()).map_err(|_| IoError::WriteError {
            message: format!("{} points exceed the UPCD point count limit", cloud.len()),
        })?;

        writer.write_all(&UPCD_MAGIC)?;
        writer.write_all(&UPCD_VERSION.to_le_bytes())?;
        writer.write_all(&[
            options.coordinate_space.to_byte(),
            options.include_colors as u8,
        ])?;
        writer.write_all(&point_count.to_le_bytes())?;
        for row in 0..4 {
            for col in 0..4 {
                writer.write_all(&options.transform[(row, col)].to_le_bytes())?;
            }
        }

        for point in cloud.iter() {
            writer.write_all(&point.position.x.to_le_bytes())?;
            writer.write_all(&point.position.y.to_le_bytes())?;
            writer.write_all(&point.position.z.to_le_bytes())?;
            if options.include_colors {
                writer.write_all(&point.color)?;
            }
        }

        Ok(())
    }
}

/// Read a UPCD file into world space with default options
pub fn read_upcd<P: AsRef<Path>>(path: P) -> Result<ColoredPointCloud3f> {
    Ok(UpcdReader::read_file(path, &UpcdReadOptions::default())?.cloud)
}

/// Write a coloured world-space UPCD file
pub fn write_upcd<P: AsRef<Path>>(cloud: &ColoredPointCloud3f, path: P) -> Result<()> {
    UpcdWriter::write_file(cloud, path, &UpcdWriteOptions::default())
}

/// Load several UPCD files into one cloud
///
/// Files are concatenated in path order. Colours survive only when every file
/// carries them; otherwise every merged point is white. The stride is applied
/// to the merged cloud.
///
/// # Arguments
/// * `paths` - Files to merge, in any order
/// * `options` - Transform and stride handling
///
/// # Returns
/// * `Result<ColoredPointCloud3f>` - The merged cloud
pub fn read_merged<P: AsRef<Path>>(paths: &[P], options: &UpcdReadOptions) -> Result<ColoredPointCloud3f> {
    let mut sorted: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
    sorted.sort();

    let per_file = UpcdReadOptions {
        stride: 1,
        ..options.clone()
    };

    let mut merged = ColoredPointCloud3f::new();
    let mut all_colored = true;
    for path in &sorted {
        let loaded = UpcdReader::read_file(path, &per_file)?;
        all_colored &= loaded.header.has_color;
        merged.extend(loaded.cloud);
    }

    if !all_colored {
        log::debug!("not every input carries colour, merged cloud defaults to white");
        for point in merged.iter_mut() {
            point.color = DEFAULT_COLOR;
        }
    }

    log::info!("merged {} files into {} points", sorted.len(), merged.len());
    Ok(merged.stride(options.stride))
}
