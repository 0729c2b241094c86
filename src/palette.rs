use opencv::core::Scalar;

/// Inclusive HSV bounds in OpenCV 8-bit units (H 0-180, S/V 0-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn lower_scalar(&self) -> Scalar {
        Scalar::new(self.lower[0] as f64, self.lower[1] as f64, self.lower[2] as f64, 0.0)
    }

    pub fn upper_scalar(&self) -> Scalar {
        Scalar::new(self.upper[0] as f64, self.upper[1] as f64, self.upper[2] as f64, 0.0)
    }
}

/// Mole colors in the order they are processed each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoleColor {
    Green = 0,
    Yellow = 1,
    Blue = 2,
    Red = 3,
}

impl MoleColor {
    pub const COUNT: usize = 4;
    pub const ALL: [MoleColor; Self::COUNT] =
        [MoleColor::Green, MoleColor::Yellow, MoleColor::Blue, MoleColor::Red];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MoleColor::Green => "green",
            MoleColor::Yellow => "yellow",
            MoleColor::Blue => "blue",
            MoleColor::Red => "red",
        }
    }

    /// Child frame id the color is broadcast under.
    pub fn frame_id(self) -> String {
        format!("{}_frame", self.name())
    }

    pub fn descriptor(self) -> &'static ColorDescriptor {
        &PALETTE[self.index()]
    }
}

/// One or two HSV ranges; two are needed when the hue wraps past 180 (red).
#[derive(Debug, Clone, Copy)]
pub struct ColorDescriptor {
    pub color: MoleColor,
    pub primary: HsvRange,
    pub wrap: Option<HsvRange>,
}

impl ColorDescriptor {
    pub fn ranges(&self) -> impl Iterator<Item = &HsvRange> {
        std::iter::once(&self.primary).chain(self.wrap.iter())
    }
}

pub static PALETTE: [ColorDescriptor; MoleColor::COUNT] = [
    ColorDescriptor {
        color: MoleColor::Green,
        primary: HsvRange::new([47, 90, 132], [94, 255, 191]),
        wrap: None,
    },
    ColorDescriptor {
        color: MoleColor::Yellow,
        primary: HsvRange::new([24, 100, 101], [52, 255, 230]),
        wrap: None,
    },
    ColorDescriptor {
        color: MoleColor::Blue,
        primary: HsvRange::new([95, 157, 85], [161, 255, 189]),
        wrap: None,
    },
    ColorDescriptor {
        color: MoleColor::Red,
        primary: HsvRange::new([0, 132, 4], [2, 241, 221]),
        wrap: Some(HsvRange::new([175, 132, 4], [180, 241, 221])),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_order_matches_index() {
        for (i, color) in MoleColor::ALL.iter().enumerate() {
            assert_eq!(color.index(), i);
            assert_eq!(PALETTE[i].color, *color);
        }
    }

    #[test]
    fn test_frame_id() {
        assert_eq!(MoleColor::Green.frame_id(), "green_frame");
        assert_eq!(MoleColor::Red.frame_id(), "red_frame");
    }

    #[test]
    fn test_red_has_wrap_range() {
        let red = MoleColor::Red.descriptor();
        assert_eq!(red.ranges().count(), 2);
        let hues: Vec<_> = red.ranges().map(|r| (r.lower[0], r.upper[0])).collect();
        assert_eq!(hues, vec![(0, 2), (175, 180)]);
        assert_eq!(MoleColor::Blue.descriptor().ranges().count(), 1);
    }

    #[test]
    fn test_hsv_range_scalars() {
        let range = HsvRange::new([10, 20, 30], [40, 50, 60]);
        assert_eq!(range.lower_scalar(), Scalar::new(10.0, 20.0, 30.0, 0.0));
        assert_eq!(range.upper_scalar(), Scalar::new(40.0, 50.0, 60.0, 0.0));
    }
}
