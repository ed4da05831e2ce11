use ndarray::{arr1, Array1, Array2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// `matrix · (vector + offset)` for a 3×3 correction.
    pub fn correct(matrix: &Array2<f64>, offset: &Array1<f64>, vector: [f64; 3]) -> [f64; 3] {
        let shifted = arr1(&vector) + offset;
        let corrected = matrix.dot(&shifted);
        [corrected[0], corrected[1], corrected[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identity_matrix_only_applies_offset() {
        let matrix = Array2::<f64>::eye(3);
        let offset = array![1.0, -2.0, 0.5];
        assert_eq!(
            MatrixHelper::correct(&matrix, &offset, [10.0, 10.0, 10.0]),
            [11.0, 8.0, 10.5]
        );
    }

    #[test]
    fn offset_is_added_before_scaling() {
        let matrix = array![[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let offset = array![1.0, 0.0, 0.0];
        assert_eq!(
            MatrixHelper::correct(&matrix, &offset, [1.0, 0.0, 0.0]),
            [4.0, 0.0, 0.0]
        );
    }
}
