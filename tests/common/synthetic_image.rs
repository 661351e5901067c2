use image::GrayImage;
use std::io::Cursor;

/// Grid of bright squares on a dark background. Every square contributes
/// four corner keypoints.
pub fn bright_squares(width: u32, height: u32, square: u32, offset: u32) -> GrayImage {
    shape_grid(width, height, square, offset, 220, 30)
}

/// Grid of dark squares on a bright background; the inverted polarity gives
/// these corners a different descriptor signature than `bright_squares`.
pub fn dark_squares(width: u32, height: u32, square: u32, offset: u32) -> GrayImage {
    shape_grid(width, height, square, offset, 30, 220)
}

fn shape_grid(width: u32, height: u32, square: u32, offset: u32, fg: u8, bg: u8) -> GrayImage {
    assert!(square > 0, "square size must be positive");
    let spacing = square * 3;
    let mut img = GrayImage::from_pixel(width, height, image::Luma([bg]));
    let mut sy = 20 + offset;
    while sy + square < height - 20 {
        let mut sx = 20 + offset;
        while sx + square < width - 20 {
            for y in sy..sy + square {
                for x in sx..sx + square {
                    img.put_pixel(x, y, image::Luma([fg]));
                }
            }
            sx += spacing;
        }
        sy += spacing;
    }
    img
}

/// Uniform image with no detectable structure.
pub fn flat(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, image::Luma([value]))
}

/// Encode a grayscale image to in-memory PNG bytes.
pub fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}
