// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transform helpers over nalgebra matrices

use cadview_core::Transform;
use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{Error, Result};

/// Convert a parsed transform (row-major) into a matrix
#[inline]
pub fn to_matrix(transform: &Transform) -> Matrix4<f64> {
    Matrix4::from_row_slice(transform.row_major())
}

/// Translate a local transform along `axis` expressed in its own frame
///
/// Equivalent to moving the node by `distance` along `axis` after
/// applying the node's rotation, so opposite calls cancel exactly.
#[inline]
pub fn translate_on_axis(m: &Matrix4<f64>, axis: &Vector3<f64>, distance: f64) -> Matrix4<f64> {
    m * Matrix4::new_translation(&(axis * distance))
}

/// Translation component of an affine matrix
#[inline]
pub fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Map a world point into the frame described by `world_matrix`
pub fn world_to_local(world_matrix: &Matrix4<f64>, p: &Point3<f64>) -> Result<Point3<f64>> {
    let inverse = world_matrix.try_inverse().ok_or(Error::Singular)?;
    Ok(inverse.transform_point(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadview_core::MatrixOrder;

    #[test]
    fn test_to_matrix_reads_rows() {
        let t = Transform::from_values(
            &[1.0, 0.0, 0.0, 4.0, 0.0, 1.0, 0.0, 5.0, 0.0, 0.0, 1.0, 6.0, 0.0, 0.0, 0.0, 1.0],
            MatrixOrder::RowMajor,
        )
        .unwrap();
        let m = to_matrix(&t);
        assert_eq!(translation(&m), Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(m.transform_point(&Point3::origin()), Point3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_translate_on_axis_uses_local_frame() {
        let rot = Matrix4::from_scaled_axis(Vector3::z() * std::f64::consts::FRAC_PI_2);
        let moved = translate_on_axis(&rot, &Vector3::x(), 2.0);
        let t = translation(&moved);
        assert_relative_eq!(t.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(t.y, 2.0, epsilon = 1e-12);

        let back = translate_on_axis(&moved, &Vector3::x(), -2.0);
        assert_relative_eq!(back, rot, epsilon = 1e-12);
    }

    #[test]
    fn test_world_to_local() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let p = world_to_local(&m, &Point3::new(1.0, 2.0, 3.0)).unwrap();
        assert_relative_eq!(p, Point3::origin());
        assert!(world_to_local(&Matrix4::zeros(), &Point3::origin()).is_err());
    }
}
