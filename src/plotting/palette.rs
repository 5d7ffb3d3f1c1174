use super::PlotError;
use crate::config::AnalysisMode;
use plotters::style::RGBColor;

/// Parse `#rrggbb` (leading `#` optional)
pub fn parse_hex(color: &str) -> Result<RGBColor, PlotError> {
    let hex = color.trim().trim_start_matches('#');
    let invalid = || PlotError::InvalidColor(color.to_string());
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |k: usize| u8::from_str_radix(&hex[k..k + 2], 16).map_err(|_| invalid());
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn from_hex_list(colors: &[&str]) -> Vec<RGBColor> {
    colors.iter().filter_map(|c| parse_hex(c).ok()).collect()
}

fn from_unit_rgb(colors: &[(f64, f64, f64)]) -> Vec<RGBColor> {
    let to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    colors
        .iter()
        .map(|&(r, g, b)| RGBColor(to_u8(r), to_u8(g), to_u8(b)))
        .collect()
}

/// Filled-contour style colour map: `colors[k]` covers
/// `[levels[k], levels[k + 1])`, values outside the levels take the end
/// colours.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteColormap {
    pub colors: Vec<RGBColor>,
    pub levels: Vec<f64>,
}

impl DiscreteColormap {
    pub fn new(colors: Vec<RGBColor>, levels: Vec<f64>) -> Self {
        Self { colors, levels }
    }

    pub fn color_for(&self, value: f64) -> Option<RGBColor> {
        if !value.is_finite() || self.colors.is_empty() {
            return None;
        }
        let k = self
            .levels
            .iter()
            .skip(1)
            .take(self.colors.len() - 1)
            .take_while(|&&l| value >= l)
            .count();
        self.colors.get(k).copied()
    }

    /// Same colours with levels multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            colors: self.colors.clone(),
            levels: self.levels.iter().map(|l| l * factor).collect(),
        }
    }
}

/// Colour map of the raw detection field
pub fn field_colormap(mode: AnalysisMode) -> DiscreteColormap {
    match mode {
        AnalysisMode::MassFlux => DiscreteColormap::new(
            from_hex_list(&[
                "#7C0607", "#903334", "#A45657", "#BA7B7C", "#FFFFFF", "#8688BA", "#6567AA",
                "#46499F", "#1F28A2",
            ]),
            vec![-5.0, -4.0, -3.0, -2.0, -1.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        ),
        AnalysisMode::Precipitation => DiscreteColormap::new(
            from_unit_rgb(&[
                (1.0, 1.0, 1.0),
                (0.0, 0.627, 1.0),
                (0.137, 0.235, 0.98),
                (0.392, 0.0, 0.627),
                (0.784, 0.0, 0.627),
                (1.0, 0.3, 0.9),
            ]),
            vec![0.0, 0.001, 0.003, 0.01, 0.03, 0.1, 0.3],
        ),
    }
}

/// Colour map of box sums and mean fluxes, levels relative to the field maximum
pub fn flux_colormap(max: f64) -> DiscreteColormap {
    let levels = (0..11).map(|k| k as f64 * (1.0 + 1.0 / 11.0) / 10.0).collect();
    DiscreteColormap::new(
        from_hex_list(&[
            "#DBA9B4", "#DDA6A0", "#D8A786", "#CAAA68", "#B1AF4C", "#8DB340", "#50B750",
            "#00B76E", "#00B28C", "#007678",
        ]),
        levels,
    )
    .scaled(max)
}

/// Colour map of the normalized variance
pub fn nvar_colormap() -> DiscreteColormap {
    DiscreteColormap::new(
        from_hex_list(&[
            "#0030C4", "#3F5BB6", "#7380C0", "#A0A7CE", "#CCCEDC", "#DDCACD", "#D09AA4",
            "#BF6A7D", "#AA3656", "#920031",
        ]),
        vec![1.0, 1.14, 1.33, 1.6, 1.78, 2.0, 2.25, 2.5, 3.0, 3.5, 4.0],
    )
}

/// Colour map of the convective timescale (h)
pub fn tauc_colormap() -> DiscreteColormap {
    DiscreteColormap::new(
        from_hex_list(&[
            "#FFFFC1", "#FDFEB3", "#FCF6A5", "#FCEF97", "#FCE88A", "#FCE07E", "#FCD873",
            "#FCD068", "#FCC860", "#FCC058", "#FCB853", "#FBB04F", "#FAA74E", "#F89F4E",
            "#F7964F", "#F58E52", "#F28655", "#F07D59", "#ED745D", "#E96C61", "#E66365",
            "#E25A6A", "#DE516D", "#D94771", "#D53D74", "#D03178", "#CB247B", "#C6117D",
            "#C10080", "#BC0083",
        ]),
        (0..=30).map(f64::from).collect(),
    )
}

/// Line colour of the k-th scale
pub fn scale_color(k: usize) -> RGBColor {
    const SCALE_COLORS: [RGBColor; 7] = [
        RGBColor(0xff, 0x00, 0x00),
        RGBColor(0xff, 0x80, 0x00),
        RGBColor(0xe6, 0xe6, 0x00),
        RGBColor(0x40, 0xff, 0x00),
        RGBColor(0x00, 0xff, 0xff),
        RGBColor(0x00, 0x40, 0xff),
        RGBColor(0xff, 0x00, 0xff),
    ];
    SCALE_COLORS[k % SCALE_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#1F28A2").unwrap(), RGBColor(0x1f, 0x28, 0xa2));
        assert_eq!(parse_hex("ff0000").unwrap(), RGBColor(255, 0, 0));
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#gg0000").is_err());
    }

    #[test]
    fn test_palette_sizes() {
        for map in [
            field_colormap(AnalysisMode::MassFlux),
            field_colormap(AnalysisMode::Precipitation),
            flux_colormap(1.0),
            nvar_colormap(),
            tauc_colormap(),
        ] {
            assert_eq!(map.colors.len() + 1, map.levels.len());
        }
    }

    #[test]
    fn test_color_for_levels() {
        let map = nvar_colormap();
        assert_eq!(map.color_for(0.5), Some(map.colors[0]));
        assert_eq!(map.color_for(1.2), Some(map.colors[1]));
        assert_eq!(map.color_for(2.0), Some(map.colors[5]));
        assert_eq!(map.color_for(100.0), Some(map.colors[9]));
        assert_eq!(map.color_for(f64::NAN), None);
    }

    #[test]
    fn test_flux_levels_scale_with_max() {
        let map = flux_colormap(10.0);
        assert!((map.levels[10] - 10.0 * (1.0 + 1.0 / 11.0)).abs() < 1e-12);
    }
}
