use magcore::math::geodesy;

/// Corner points of a lawnmower survey: `legs` parallel passes of
/// `leg_length` metres along `bearing`, joined by cross legs of `spacing`
/// metres to the right of the first pass.
pub fn lawnmower(origin: (f64, f64), bearing: f64, legs: usize, leg_length: f64, spacing: f64) -> Vec<(f64, f64)> {
    let mut corners = vec![origin];
    let mut current = origin;
    for leg in 0..legs {
        let along = if leg % 2 == 0 { bearing } else { bearing + 180.0 };
        current = geodesy::direct(current.0, current.1, along, leg_length);
        corners.push(current);
        if leg + 1 < legs {
            current = geodesy::direct(current.0, current.1, bearing + 90.0, spacing);
            corners.push(current);
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_alternate_direction() {
        let corners = lawnmower((50.0, 30.0), 0.0, 3, 60.0, 10.0);
        assert_eq!(corners.len(), 6);
        assert!(corners[1].0 > corners[0].0);
        assert!(corners[3].0 < corners[2].0);
        let cross = geodesy::distance(corners[1].0, corners[1].1, corners[2].0, corners[2].1);
        assert!((cross - 10.0).abs() < 1e-6);
    }
}
