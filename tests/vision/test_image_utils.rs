// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Image utility tests: decoding request images and encoding crops

use base64::{engine::general_purpose::STANDARD, Engine as _};
use fabstir_object_crop::vision::{
    crop_to_box, decode_base64_image, encode_jpeg, to_jpeg_data_uri, DetectionBox, ImageError,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

const MAX: usize = 10 * 1024 * 1024;

fn rgba_png_base64(width: u32, height: u32) -> String {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 128]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf)
}

#[cfg(test)]
mod image_utils_tests {
    use super::*;

    #[test]
    fn test_bare_and_data_uri_decode_identically() {
        let bare = rgba_png_base64(9, 5);
        let uri = format!("data:image/png;base64,{}", bare);

        let (a, info_a) = decode_base64_image(&bare, MAX).unwrap();
        let (b, info_b) = decode_base64_image(&uri, MAX).unwrap();

        assert_eq!((info_a.width, info_a.height), (9, 5));
        assert_eq!(info_a.size_bytes, info_b.size_bytes);
        assert_eq!(a.to_rgba8().into_raw(), b.to_rgba8().into_raw());
    }

    #[test]
    fn test_invalid_base64_is_reported() {
        let err = decode_base64_image("@@@not-base64@@@", MAX).unwrap_err();
        assert!(matches!(err, ImageError::InvalidBase64(_)));
    }

    #[test]
    fn test_alpha_crop_encodes_as_jpeg() {
        let (image, _) = decode_base64_image(&rgba_png_base64(20, 20), MAX).unwrap();
        let bbox = DetectionBox {
            x1: 2.4,
            y1: 3.0,
            x2: 11.2,
            y2: 9.0,
            confidence: 0.8,
            mask_area: 30,
        };

        let region = crop_to_box(&image, &bbox).unwrap();
        assert_eq!((region.width(), region.height()), (10, 6));

        let jpeg = encode_jpeg(&region, 95).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(to_jpeg_data_uri(&jpeg).starts_with("data:image/jpeg;base64,/9j/"));
    }
}
