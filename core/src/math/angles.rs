/// Normalises an angle in degrees to `[0, 360)`.
pub fn wrap_360(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest angular distance between two headings, in `[0, 180]`.
pub fn heading_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs();
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_handles_negative_angles() {
        assert_eq!(wrap_360(-90.0), 270.0);
        assert_eq!(wrap_360(360.0), 0.0);
        assert_eq!(wrap_360(725.0), 5.0);
    }

    #[test]
    fn heading_diff_is_circular() {
        assert_eq!(heading_diff(10.0, 10.0), 0.0);
        assert_eq!(heading_diff(350.0, 10.0), 20.0);
        assert_eq!(heading_diff(10.0, 350.0), 20.0);
        assert_eq!(heading_diff(0.0, 180.0), 180.0);
    }

    #[test]
    fn heading_diff_is_symmetric_and_bounded() {
        let mut a = 0.0;
        while a < 360.0 {
            let mut b = 0.0;
            while b < 360.0 {
                let d = heading_diff(a, b);
                assert_eq!(d, heading_diff(b, a));
                assert!((0.0..=180.0).contains(&d), "{} {} -> {}", a, b, d);
                b += 17.5;
            }
            a += 13.0;
        }
    }
}
