//! Named per-axis triples
//!
//! Acquisition parameters come in two orders: user-facing tuples are
//! (readout, phase, slice) while volumes are stored slice-major, i.e. numpy
//! shape (slice, phase, readout). `Axes3` names every component so the two
//! orders only meet through the explicit conversions below.
//!
//! Volumes are flat buffers with readout varying fastest:
//! index = rd + ph*n_rd + sl*n_rd*n_ph

use crate::error::{ReconError, ReconResult};

/// A value per encoding axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Axes3<T> {
    pub readout: T,
    pub phase: T,
    pub slice: T,
}

impl<T: Copy> Axes3<T> {
    pub const fn new(readout: T, phase: T, slice: T) -> Self {
        Self { readout, phase, slice }
    }

    /// Same value on every axis
    pub const fn splat(v: T) -> Self {
        Self { readout: v, phase: v, slice: v }
    }

    /// From a user-facing `[readout, phase, slice]` tuple
    pub fn from_rd_ph_sl(v: [T; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    /// From a storage-order `[slice, phase, readout]` shape
    pub fn from_storage_order(v: [T; 3]) -> Self {
        Self::new(v[2], v[1], v[0])
    }

    pub fn to_rd_ph_sl(self) -> [T; 3] {
        [self.readout, self.phase, self.slice]
    }

    pub fn to_storage_order(self) -> [T; 3] {
        [self.slice, self.phase, self.readout]
    }

    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> Axes3<U> {
        Axes3 {
            readout: f(self.readout),
            phase: f(self.phase),
            slice: f(self.slice),
        }
    }

    pub fn zip_with<U: Copy, V, F: FnMut(T, U) -> V>(self, other: Axes3<U>, mut f: F) -> Axes3<V> {
        Axes3 {
            readout: f(self.readout, other.readout),
            phase: f(self.phase, other.phase),
            slice: f(self.slice, other.slice),
        }
    }
}

impl Axes3<usize> {
    /// Total number of voxels
    #[inline]
    pub fn len(&self) -> usize {
        self.readout * self.phase * self.slice
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of voxel (rd, ph, sl)
    #[inline(always)]
    pub fn index(&self, rd: usize, ph: usize, sl: usize) -> usize {
        rd + ph * self.readout + sl * self.readout * self.phase
    }

    /// Fail if any extent is zero
    pub fn validate(&self) -> ReconResult<()> {
        if self.readout == 0 || self.phase == 0 || self.slice == 0 {
            return Err(ReconError::ShapeMismatch(format!(
                "volume dimensions must be non-zero, got {}x{}x{} (rd x ph x sl)",
                self.readout, self.phase, self.slice
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_conversions() {
        let a = Axes3::from_rd_ph_sl([1, 2, 3]);
        assert_eq!(a.readout, 1);
        assert_eq!(a.slice, 3);
        assert_eq!(a.to_storage_order(), [3, 2, 1]);
        assert_eq!(Axes3::from_storage_order(a.to_storage_order()), a);
        assert_eq!(a.to_rd_ph_sl(), [1, 2, 3]);
    }

    #[test]
    fn test_index_readout_fastest() {
        let dims = Axes3::new(4usize, 3, 2);
        assert_eq!(dims.len(), 24);
        assert_eq!(dims.index(1, 0, 0), 1);
        assert_eq!(dims.index(0, 1, 0), 4);
        assert_eq!(dims.index(0, 0, 1), 12);
        assert_eq!(dims.index(3, 2, 1), 23);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(Axes3::new(4usize, 0, 2).validate().is_err());
        assert!(Axes3::new(1usize, 1, 1).validate().is_ok());
    }
}
