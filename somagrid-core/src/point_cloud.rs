//! Point cloud data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A generic point cloud container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with colored points
pub type ColoredPointCloud3f = PointCloud<ColoredPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<T> {
        self.points.iter()
    }

    /// Get a mutable iterator over the points
    pub fn iter_mut(&mut self) -> std::slice::IterMut<T> {
        self.points.iter_mut()
    }
}

impl<T: Clone> PointCloud<T> {
    /// Keep every `step`-th point, starting with the first one
    ///
    /// A step of 0 or 1 returns an unchanged copy.
    pub fn stride(&self, step: usize) -> Self {
        if step <= 1 {
            return self.clone();
        }
        self.points.iter().step_by(step).cloned().collect()
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

impl PointCloud<ColoredPoint3f> {
    /// Build a coloured cloud from parallel position and colour arrays
    ///
    /// When `colors` is `None` every point gets [`DEFAULT_COLOR`].
    /// Mismatched array lengths are rejected.
    pub fn from_parts(positions: &[Point3f], colors: Option<&[Rgb]>) -> Result<Self> {
        match colors {
            Some(colors) => {
                if colors.len() != positions.len() {
                    return Err(Error::InvalidData(format!(
                        "color count {} does not match point count {}",
                        colors.len(),
                        positions.len()
                    )));
                }
                Ok(positions
                    .iter()
                    .zip(colors)
                    .map(|(p, c)| ColoredPoint3f::new(*p, *c))
                    .collect())
            }
            None => Ok(positions
                .iter()
                .map(|p| ColoredPoint3f::new(*p, DEFAULT_COLOR))
                .collect()),
        }
    }

    /// Positions as a separate array
    pub fn positions(&self) -> Vec<Point3f> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Colours as a separate array
    pub fn colors(&self) -> Vec<Rgb> {
        self.points.iter().map(|p| p.color).collect()
    }

    /// Bounding box of all positions
    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(self.points.iter().map(|p| &p.position))
    }
}
