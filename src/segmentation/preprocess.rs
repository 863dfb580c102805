use super::types::{BACKGROUND, FOREGROUND};
use image::{imageops, DynamicImage, GrayImage};

/// Convert any decoded image to an 8-bit luma frame
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Snap every pixel to {0, 255}: values strictly above `cut` become foreground
pub fn binarize(mask: &GrayImage, cut: u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    let data = mask
        .as_raw()
        .iter()
        .map(|&v| if v > cut { FOREGROUND } else { BACKGROUND })
        .collect();
    from_buffer(width, height, data)
}

/// Resize a binary mask with nearest-neighbour sampling
///
/// Nearest neighbour never invents intermediate values on a hard mask
/// boundary. Returns a copy when the size already matches.
pub fn resize_nearest(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let _span = tracing::debug_span!("resize_nearest").entered();
    imageops::resize(mask, width, height, imageops::FilterType::Nearest)
}

/// Mark pixels whose intensity changed by more than `threshold` since the
/// previous frame
///
/// Both images must share dimensions; the caller checks this.
pub fn frame_difference(current: &GrayImage, previous: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = current.dimensions();
    let data = current
        .as_raw()
        .iter()
        .zip(previous.as_raw())
        .map(|(&a, &b)| {
            if a.abs_diff(b) > threshold {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
        .collect();
    from_buffer(width, height, data)
}

/// Pixel-wise OR of two binary masks of equal size
pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    let data = a.as_raw().iter().zip(b.as_raw()).map(|(&x, &y)| x | y).collect();
    from_buffer(width, height, data)
}

/// Wrap a row-major buffer whose length is known to be `width * height`
pub(crate) fn from_buffer(width: u32, height: u32, data: Vec<u8>) -> GrayImage {
    GrayImage::from_vec(width, height, data)
        .unwrap_or_else(|| GrayImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_binarize_is_strict() {
        let mask = GrayImage::from_raw(4, 1, vec![0, 127, 128, 255]).unwrap();
        assert_eq!(binarize(&mask, 127).as_raw(), &vec![0, 0, 255, 255]);
        assert_eq!(binarize(&mask, 200).as_raw(), &vec![0, 0, 0, 255]);
    }

    #[test]
    fn test_to_grayscale_from_rgb() {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([255, 255, 255]));
        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.dimensions(), (3, 2));
        assert!(gray.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_resize_nearest_keeps_values_binary() {
        let mut mask = GrayImage::new(8, 8);
        for y in 0..4 {
            for x in 0..4 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let small = resize_nearest(&mask, 4, 4);
        assert!(small.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(small.get_pixel(0, 0)[0], 255);
        assert_eq!(small.get_pixel(1, 1)[0], 255);
        assert_eq!(small.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn test_frame_difference_and_or() {
        let a = GrayImage::from_raw(3, 1, vec![0, 100, 200]).unwrap();
        let b = GrayImage::from_raw(3, 1, vec![0, 131, 170]).unwrap();
        let diff = frame_difference(&a, &b, 30);
        assert_eq!(diff.as_raw(), &vec![0, 255, 0]);

        let other = GrayImage::from_raw(3, 1, vec![255, 0, 0]).unwrap();
        assert_eq!(bitwise_or(&diff, &other).as_raw(), &vec![255, 255, 0]);
    }
}
