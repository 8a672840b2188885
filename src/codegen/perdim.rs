//! Per-dimension address arithmetic
//!
//! For a flat element index `i` the emitted code walks the axes from the
//! innermost outwards, advancing a byte pointer by `(index % dim) * stride`
//! and dividing the running index by `dim`. Axis 0 takes the remainder.
//! Strides are signed byte strides.

use crate::error::{GpuError, Result};

/// Shape and signed byte strides of one strided operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout<'a> {
    dims: &'a [usize],
    strides: &'a [isize],
}

impl<'a> Layout<'a> {
    pub fn new(dims: &'a [usize], strides: &'a [isize]) -> Result<Self> {
        check_layout(dims, strides)?;
        Ok(Self { dims, strides })
    }

    pub fn dims(&self) -> &'a [usize] {
        self.dims
    }

    pub fn strides(&self) -> &'a [isize] {
        self.strides
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements described by the shape.
    ///
    /// `InvalidArgument` when the product does not fit in `usize`.
    pub fn count(&self) -> Result<usize> {
        if self.dims.contains(&0) {
            return Ok(0);
        }
        self.dims
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| GpuError::invalid(format!("shape {:?} overflows the element count", self.dims)))
    }

    pub fn byte_extent(&self, elsize: usize) -> Result<Option<(isize, isize)>> {
        byte_extent(self.dims, self.strides, elsize)
    }
}

/// Emit one source fragment per axis advancing the byte pointer `var`.
///
/// Fragments are ordered innermost axis first; the first one declares the
/// running index `<var>i`. Nothing is emitted for zero axes.
pub fn emit_perdim(dims: &[usize], strides: &[isize], var: &str) -> Result<Vec<String>> {
    check_layout(dims, strides)?;
    let nd = dims.len();
    if nd == 0 {
        return Ok(Vec::new());
    }

    let mut fragments = Vec::with_capacity(nd);
    for axis in (0..nd).rev() {
        let mut fragment = String::new();
        if axis == nd - 1 {
            fragment.push_str(&format!("ulong {var}i = i;"));
        }
        if axis > 0 {
            fragment.push_str(&format!(
                "{var} += (long)({var}i % {dim}UL) * ({stride}L);{var}i = {var}i / {dim}UL;",
                dim = dims[axis],
                stride = strides[axis],
            ));
        } else {
            fragment.push_str(&format!(
                "{var} += (long){var}i * ({stride}L);",
                stride = strides[0]
            ));
        }
        fragments.push(fragment);
    }
    Ok(fragments)
}

/// Byte offset the emitted arithmetic reaches for flat index `index`.
pub fn strided_byte_offset(index: usize, dims: &[usize], strides: &[isize]) -> isize {
    let mut rest = index;
    let mut offset = 0isize;
    for axis in (1..dims.len()).rev() {
        offset += (rest % dims[axis]) as isize * strides[axis];
        rest /= dims[axis];
    }
    if let Some(&stride) = strides.first() {
        offset += rest as isize * stride;
    }
    offset
}

/// Half-open byte range `[min, max)` touched by elements of `elsize` bytes.
///
/// Returns `None` when the layout holds no element, `InvalidArgument` when
/// the range does not fit in `isize`.
pub fn byte_extent(
    dims: &[usize],
    strides: &[isize],
    elsize: usize,
) -> Result<Option<(isize, isize)>> {
    if dims.contains(&0) {
        return Ok(None);
    }
    let overflow = || GpuError::invalid(format!("layout {:?} / {:?} overflows its byte range", dims, strides));

    let mut min = 0isize;
    let mut max = 0isize;
    for (&dim, &stride) in dims.iter().zip(strides) {
        let reach = isize::try_from(dim - 1)
            .ok()
            .and_then(|last| last.checked_mul(stride))
            .ok_or_else(overflow)?;
        if reach < 0 {
            min = min.checked_add(reach).ok_or_else(overflow)?;
        } else {
            max = max.checked_add(reach).ok_or_else(overflow)?;
        }
    }
    let max = isize::try_from(elsize)
        .ok()
        .and_then(|elsize| max.checked_add(elsize))
        .ok_or_else(overflow)?;
    Ok(Some((min, max)))
}

/// Byte strides of a dense row-major array of elements of `elsize` bytes.
pub fn contiguous_strides(dims: &[usize], elsize: usize) -> Vec<isize> {
    let mut strides = vec![0isize; dims.len()];
    let mut step = elsize as isize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = step;
        step *= dims[axis] as isize;
    }
    strides
}

pub(crate) fn check_layout(dims: &[usize], strides: &[isize]) -> Result<()> {
    if dims.len() != strides.len() {
        return Err(GpuError::invalid(format!(
            "layout has {} dimensions but {} strides",
            dims.len(),
            strides.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_emit_zero_dims() {
        assert!(emit_perdim(&[], &[], "a_p").unwrap().is_empty());
    }

    #[test]
    fn test_emit_one_fragment_per_axis() {
        let fragments = emit_perdim(&[2, 3], &[12, 4], "a_p").unwrap();
        assert_eq!(
            fragments,
            vec![
                "ulong a_pi = i;a_p += (long)(a_pi % 3UL) * (4L);a_pi = a_pi / 3UL;".to_string(),
                "a_p += (long)a_pi * (12L);".to_string(),
            ]
        );
    }

    #[test]
    fn test_emit_single_axis() {
        let fragments = emit_perdim(&[5], &[-8], "b_p").unwrap();
        assert_eq!(fragments, vec!["ulong b_pi = i;b_p += (long)b_pi * (-8L);".to_string()]);
    }

    #[test]
    fn test_emit_rejects_mismatched_strides() {
        assert!(emit_perdim(&[2, 3], &[4], "a_p").is_err());
    }

    #[rstest]
    // row-major 2x3 float32
    #[case(&[2, 3], &[12, 4], &[0, 4, 8, 12, 16, 20])]
    // column-major 3x2 float64
    #[case(&[3, 2], &[8, 24], &[0, 24, 8, 32, 16, 40])]
    // reversed axis
    #[case(&[3], &[-4], &[0, -4, -8])]
    fn test_strided_byte_offset(
        #[case] dims: &[usize],
        #[case] strides: &[isize],
        #[case] expected: &[isize],
    ) {
        let got: Vec<isize> = (0..expected.len())
            .map(|i| strided_byte_offset(i, dims, strides))
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_transpose_mapping() {
        // Reading a row-major 2x3 array through transposed strides visits it
        // column by column, which is the row-major order of its 3x2 transpose.
        let src_dims = [3, 2];
        let src_strides = [4, 12];
        let visited: Vec<isize> = (0..6)
            .map(|i| strided_byte_offset(i, &src_dims, &src_strides) / 4)
            .collect();
        assert_eq!(visited, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_layout() {
        let layout = Layout::new(&[2, 3], &[12, 4]).unwrap();
        assert_eq!(layout.ndim(), 2);
        assert_eq!(layout.count().unwrap(), 6);
        assert_eq!(layout.byte_extent(4).unwrap(), Some((0, 24)));
        assert!(Layout::new(&[2, 3], &[12]).is_err());
        assert_eq!(Layout::new(&[], &[]).unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4], 8), vec![96, 32, 8]);
        assert!(contiguous_strides(&[], 4).is_empty());
    }

    #[test]
    fn test_byte_extent() {
        assert_eq!(byte_extent(&[2, 3], &[12, 4], 4).unwrap(), Some((0, 24)));
        assert_eq!(byte_extent(&[3], &[-4], 4).unwrap(), Some((-8, 4)));
        assert_eq!(byte_extent(&[], &[], 8).unwrap(), Some((0, 8)));
        assert_eq!(byte_extent(&[0, 3], &[12, 4], 4).unwrap(), None);
    }

    #[rstest]
    #[case(&[1 << 33, 1 << 31], &[8, 8])]
    #[case(&[usize::MAX, 2], &[0, 0])]
    fn test_count_overflow(#[case] dims: &[usize], #[case] strides: &[isize]) {
        let err = Layout::new(dims, strides).unwrap().count().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_count_with_zero_axis_never_overflows() {
        let layout = Layout::new(&[usize::MAX, usize::MAX, 0], &[0, 0, 0]).unwrap();
        assert_eq!(layout.count().unwrap(), 0);
    }

    #[rstest]
    // reach of one axis overflows
    #[case(&[1 << 62], &[8], 8)]
    // axis length does not fit in isize
    #[case(&[usize::MAX], &[1], 1)]
    // sum of positive reaches overflows
    #[case(&[1 << 61, 1 << 61], &[4, 4], 4)]
    // sum of negative reaches overflows
    #[case(&[1 << 61, 1 << 61], &[-4, -4], 4)]
    // element size pushes the end past isize::MAX
    #[case(&[2], &[isize::MAX], 1)]
    fn test_byte_extent_overflow(#[case] dims: &[usize], #[case] strides: &[isize], #[case] elsize: usize) {
        let err = byte_extent(dims, strides, elsize).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
