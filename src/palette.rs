use serde::{Deserialize, Serialize};

/// Named four-stop color ramps applied across the frequency axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    #[default]
    Dreamy,
    Ocean,
    Plasma,
    Heat,
    Amazonia,
    Jinx,
    Spectral,
    Golden,
    Kawaii,
    MetalGear,
}

impl Palette {
    pub const ALL: [Palette; 10] = [
        Palette::Dreamy,
        Palette::Ocean,
        Palette::Plasma,
        Palette::Heat,
        Palette::Amazonia,
        Palette::Jinx,
        Palette::Spectral,
        Palette::Golden,
        Palette::Kawaii,
        Palette::MetalGear,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Palette::Dreamy => "Dreamy",
            Palette::Ocean => "Ocean",
            Palette::Plasma => "Plasma",
            Palette::Heat => "Heat",
            Palette::Amazonia => "Amazonia",
            Palette::Jinx => "Jinx",
            Palette::Spectral => "Spectral",
            Palette::Golden => "Golden",
            Palette::Kawaii => "Kawaii",
            Palette::MetalGear => "Metal Gear",
        }
    }

    pub fn stops(self) -> [[u8; 3]; 4] {
        match self {
            Palette::Dreamy => [[0x00, 0x00, 0x04], [0x3b, 0x0f, 0x70], [0x8c, 0x29, 0x81], [0xfe, 0x9f, 0x6d]],
            Palette::Ocean => [[0x01, 0x0a, 0x1a], [0x00, 0x30, 0x49], [0x02, 0x3e, 0x8a], [0x00, 0x77, 0xb6]],
            Palette::Plasma => [[0x10, 0x00, 0x2b], [0x7b, 0x2c, 0xbf], [0xff, 0x00, 0x6e], [0xff, 0xdd, 0xe1]],
            Palette::Heat => [[0x00, 0x00, 0x00], [0x5a, 0x10, 0x0c], [0xc4, 0x4e, 0x05], [0xd4, 0xa0, 0x17]],
            Palette::Amazonia => [[0x00, 0x0a, 0x00], [0x00, 0x22, 0x00], [0x00, 0x5f, 0x41], [0x00, 0xff, 0x41]],
            Palette::Jinx => [[0x24, 0x00, 0x46], [0x7b, 0x2c, 0xbf], [0x43, 0x61, 0xee], [0x3a, 0x0c, 0xa3]],
            Palette::Spectral => [[0x2e, 0x00, 0x3e], [0x7f, 0x29, 0x82], [0xc6, 0x00, 0x55], [0xe6, 0x7e, 0x00]],
            Palette::Golden => [[0x05, 0x04, 0x03], [0x5e, 0x4b, 0x35], [0xb0, 0x8d, 0x55], [0x96, 0x70, 0x0e]],
            Palette::Kawaii => [[0x2b, 0x0f, 0x31], [0xff, 0x7e, 0xb9], [0xff, 0x9a, 0x8b], [0x9b, 0x59, 0xb6]],
            Palette::MetalGear => [[0x05, 0x05, 0x05], [0x22, 0x22, 0x22], [0x44, 0x44, 0x44], [0x77, 0x77, 0x77]],
        }
    }

    /// Color at position `t` in `[0, 1]`, blending stops at 0.33 and 0.66.
    pub fn color_at(self, t: f32) -> [u8; 3] {
        let [c1, c2, c3, c4] = self.stops();
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        if t < 0.33 {
            lerp_rgb(c1, c2, t / 0.33)
        } else if t < 0.66 {
            lerp_rgb(c2, c3, (t - 0.33) / 0.33)
        } else {
            lerp_rgb(c3, c4, (t - 0.66) / 0.34)
        }
    }
}

fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for (i, channel) in out.iter_mut().enumerate() {
        let v = f32::from(a[i]) + (f32::from(b[i]) - f32::from(a[i])) * t;
        *channel = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// How the height field is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Solid,
    Dots,
    Lines,
    Wire,
    Bars,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 5] = [
        DisplayMode::Solid,
        DisplayMode::Dots,
        DisplayMode::Lines,
        DisplayMode::Wire,
        DisplayMode::Bars,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Solid => "Solid",
            DisplayMode::Dots => "Dots",
            DisplayMode::Lines => "Lines",
            DisplayMode::Wire => "Wire",
            DisplayMode::Bars => "Bars",
        }
    }
}
