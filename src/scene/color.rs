//! Colour helpers for track accents and bar hues.

/// Parse `#rrggbb` (or `rrggbb`) into linear-ish RGB in [0, 1]
pub fn parse_hex_color(hex: &str) -> Option<[f32; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([
        channel(0)? as f32 / 255.0,
        channel(2)? as f32 / 255.0,
        channel(4)? as f32 / 255.0,
    ])
}

/// Hue of an RGB colour in [0, 1); greys report 0
pub fn rgb_to_hue([r, g, b]: [f32; 3]) -> f32 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta <= f32::EPSILON {
        return 0.0;
    }
    let sector = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (sector / 6.0).rem_euclid(1.0)
}

/// Hue of a `#rrggbb` string, or `None` if it does not parse
pub fn hex_to_hue(hex: &str) -> Option<f32> {
    parse_hex_color(hex).map(rgb_to_hue)
}

/// HSL to RGB, all components in [0, 1]
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    if saturation <= 0.0 {
        return [lightness; 3];
    }
    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;
    let h = hue.rem_euclid(1.0);

    let channel = |t: f32| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    [channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_color("#ff0000"), Some([1.0, 0.0, 0.0]));
        assert_eq!(parse_hex_color("00ff00"), Some([0.0, 1.0, 0.0]));
        assert_eq!(parse_hex_color("#fff"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn test_primary_hues() {
        assert_eq!(hex_to_hue("#ff0000"), Some(0.0));
        assert!((hex_to_hue("#00ff00").unwrap() - 1.0 / 3.0).abs() < 1e-5);
        assert!((hex_to_hue("#0000ff").unwrap() - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(hex_to_hue("#808080"), Some(0.0));
    }

    #[test]
    fn test_hsl_primaries() {
        assert!(close(hsl_to_rgb(0.0, 1.0, 0.5), [1.0, 0.0, 0.0]));
        assert!(close(hsl_to_rgb(1.0 / 3.0, 1.0, 0.5), [0.0, 1.0, 0.0]));
        assert!(close(hsl_to_rgb(2.0 / 3.0, 1.0, 0.5), [0.0, 0.0, 1.0]));
        assert!(close(hsl_to_rgb(0.3, 0.0, 0.25), [0.25; 3]));
    }

    #[test]
    fn test_hue_round_trip() {
        // Track accent colours survive hex -> hue -> rgb at full saturation
        let hue = hex_to_hue("#00aaff").unwrap();
        let rgb = hsl_to_rgb(hue, 1.0, 0.5);
        assert!(close(rgb, [0.0, 2.0 / 3.0, 1.0]));
    }
}
