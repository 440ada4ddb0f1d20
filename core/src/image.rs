use image::GrayImage;

/// Shape of an image in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageDimension {
    pub width: u32,
    pub height: u32,
}

impl ImageDimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the continuous pixel coordinate lies inside the image bounds.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }
}

/// Bilinear interpolation of a gray image. Returns `None` outside the image.
pub fn bilinear_interpolate(img: &GrayImage, x: f64, y: f64) -> Option<f32> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }
    if x < 0.0 || y < 0.0 || x > (img.width() - 1) as f64 || y > (img.height() - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    let dx = (x - x0 as f64) as f32;
    let dy = (y - y0 as f64) as f32;

    let i00 = img.get_pixel(x0, y0)[0] as f32;
    let i01 = img.get_pixel(x0, y1)[0] as f32;
    let i10 = img.get_pixel(x1, y0)[0] as f32;
    let i11 = img.get_pixel(x1, y1)[0] as f32;

    Some(
        i00 * (1.0 - dx) * (1.0 - dy)
            + i10 * dx * (1.0 - dy)
            + i01 * (1.0 - dx) * dy
            + i11 * dx * dy,
    )
}
