//! Firmware container
//!
//! A [`Firmware`] owns the raw payload and an ordered list of [`Image`]s,
//! each naming a byte range of that payload. The payload is immutable once
//! constructed and image ranges are checked to be in bounds and disjoint.
//!
//! Formats whose structure we do not check yet come in through
//! [`Firmware::parse_unvalidated`], which yields an [`UnvalidatedFirmware`].
//! That type cannot be handed to a device until the caller either validates
//! it or explicitly opts out with [`UnvalidatedFirmware::assume_valid`].

use std::ops::Range;

use crate::error::{Error, Result};

/// A logical image inside a firmware payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    id: Option<String>,
    range: Range<usize>,
    address: Option<u32>,
    board_id: Option<u16>,
}

impl Image {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            id: None,
            range,
            address: None,
            board_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Device address the image is meant to be written to
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_board_id(mut self, board_id: u16) -> Self {
        self.board_id = Some(board_id);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn address(&self) -> Option<u32> {
        self.address
    }

    pub fn board_id(&self) -> Option<u16> {
        self.board_id
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Raw firmware bytes plus their image layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    bytes: Vec<u8>,
    images: Vec<Image>,
}

impl Firmware {
    /// A payload consisting of one image covering all of it
    pub fn new(bytes: Vec<u8>) -> Self {
        let images = vec![Image::new(0..bytes.len())];
        Self { bytes, images }
    }

    /// A payload with an explicit image layout
    pub fn from_images(bytes: Vec<u8>, images: Vec<Image>) -> Result<Self> {
        check_layout(bytes.len(), &images)?;
        Ok(Self { bytes, images })
    }

    /// Wrap `bytes` and `images` without checking the layout
    pub fn parse_unvalidated(bytes: Vec<u8>, images: Vec<Image>) -> UnvalidatedFirmware {
        UnvalidatedFirmware {
            inner: Self { bytes, images },
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image_by_id(&self, id: &str) -> Option<&Image> {
        self.images.iter().find(|img| img.id() == Some(id))
    }

    /// The image with no ID, or the first image
    pub fn default_image(&self) -> Option<&Image> {
        self.images
            .iter()
            .find(|img| img.id().is_none())
            .or_else(|| self.images.first())
    }

    /// Bytes covered by `image`; fails if the range lies outside this firmware
    pub fn image_bytes(&self, image: &Image) -> Result<&[u8]> {
        let range = image.range();
        self.bytes.get(range.clone()).ok_or_else(|| {
            Error::Internal(format!(
                "image range 0x{:x}..0x{:x} outside firmware of 0x{:x} bytes",
                range.start,
                range.end,
                self.bytes.len()
            ))
        })
    }

    /// Bytes of [`Firmware::default_image`]
    pub fn default_image_bytes(&self) -> Result<&[u8]> {
        let image = self
            .default_image()
            .ok_or_else(|| Error::NotSupported("firmware has no images".into()))?;
        self.image_bytes(image)
    }
}

fn check_layout(len: usize, images: &[Image]) -> Result<()> {
    for image in images {
        let range = image.range();
        if range.start > range.end || range.end > len {
            return Err(Error::NotSupported(format!(
                "image {} range 0x{:x}..0x{:x} outside firmware of 0x{:x} bytes",
                image.id().unwrap_or("(default)"),
                range.start,
                range.end,
                len
            )));
        }
    }

    let mut sorted: Vec<&Image> = images.iter().collect();
    sorted.sort_by_key(|img| img.range.start);
    for pair in sorted.windows(2) {
        if pair[0].range.end > pair[1].range.start {
            return Err(Error::NotSupported(format!(
                "images {} and {} overlap",
                pair[0].id().unwrap_or("(default)"),
                pair[1].id().unwrap_or("(default)")
            )));
        }
    }
    Ok(())
}

/// Firmware whose layout has not been checked
#[derive(Debug, Clone)]
pub struct UnvalidatedFirmware {
    inner: Firmware,
}

impl UnvalidatedFirmware {
    pub fn bytes(&self) -> &[u8] {
        self.inner.bytes()
    }

    /// Check the layout, turning this into a normal [`Firmware`]
    pub fn validate(self) -> Result<Firmware> {
        check_layout(self.inner.len(), &self.inner.images)?;
        Ok(self.inner)
    }

    /// Use the firmware without any layout check
    ///
    /// Images may overlap or extend past the payload; accessing such an
    /// image panics.
    pub fn assume_valid(self) -> Firmware {
        log::warn!(
            "using unvalidated firmware ({} bytes, {} images)",
            self.inner.len(),
            self.inner.images.len()
        );
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_image() {
        let fw = Firmware::new(vec![1, 2, 3]);
        assert_eq!(fw.images().len(), 1);
        assert_eq!(fw.default_image_bytes().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_images_disjoint() {
        let bytes = vec![0u8; 0x100];
        let fw = Firmware::from_images(
            bytes.clone(),
            vec![
                Image::new(0x80..0x100).with_id("b").with_board_id(7),
                Image::new(0..0x80).with_id("a"),
            ],
        )
        .unwrap();
        assert_eq!(fw.image_by_id("b").and_then(Image::board_id), Some(7));
        assert_eq!(fw.default_image().and_then(Image::id), Some("b"));

        let err = Firmware::from_images(
            bytes.clone(),
            vec![Image::new(0..0x81), Image::new(0x80..0x100)],
        )
        .unwrap_err();
        assert!(err.is_not_supported());

        assert!(Firmware::from_images(bytes, vec![Image::new(0..0x101)]).is_err());
    }

    #[test]
    fn test_unvalidated_path() {
        let raw = Firmware::parse_unvalidated(vec![0u8; 4], vec![Image::new(0..8)]);
        assert_eq!(raw.bytes().len(), 4);
        assert!(raw.clone().validate().is_err());
        assert_eq!(raw.assume_valid().images().len(), 1);
    }

    #[test]
    fn test_out_of_range_image_is_error() {
        let fw = Firmware::parse_unvalidated(vec![0u8; 4], vec![Image::new(0..8)]).assume_valid();
        let err = fw.default_image_bytes().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);

        let other = Firmware::new(vec![1, 2, 3, 4, 5, 6]);
        assert!(fw.image_bytes(&Image::new(2..6)).is_err());
        assert_eq!(other.image_bytes(&Image::new(2..6)).unwrap(), &[3, 4, 5, 6]);
    }
}
