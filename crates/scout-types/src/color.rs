/// RGB 高亮颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// 按名称取颜色，未知名称回退为白色
pub fn color_by_name(name: &str) -> Rgb {
    match name.to_ascii_lowercase().as_str() {
        "red" => Rgb(255, 0, 0),
        "green" => Rgb(0, 255, 0),
        "blue" => Rgb(0, 0, 255),
        "purple" => Rgb(128, 0, 128),
        "yellow" => Rgb(255, 255, 0),
        "orange" => Rgb(255, 165, 0),
        "cyan" => Rgb(0, 255, 255),
        "magenta" => Rgb(255, 0, 255),
        "black" => Rgb(0, 0, 0),
        _ => Rgb(255, 255, 255),
    }
}

/// 标注框的颜色和线宽
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub color: Rgb,
    pub thickness: u32,
}

impl Highlight {
    pub fn new(color_name: &str, thickness: u32) -> Self {
        Self {
            color: color_by_name(color_name),
            thickness: thickness.max(1),
        }
    }
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            color: Rgb(255, 255, 255),
            thickness: 3,
        }
    }
}
