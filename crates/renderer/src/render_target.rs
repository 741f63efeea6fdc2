//! Descriptions of the images a frame renders into.

use ash::vk;

/// Images of one render target, indexed by acquired swapchain image index.
///
/// Two targets exist: the on-screen surface and the offscreen viewport. Each
/// is rebuilt on its own schedule; consumers receive a fresh description
/// every time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl RenderTargetDesc {
    /// Number of images in the target.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image and view for `image_index`, if in range.
    pub fn get(&self, image_index: u32) -> Option<(vk::Image, vk::ImageView)> {
        let index = image_index as usize;
        Some((*self.images.get(index)?, *self.image_views.get(index)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_get_in_and_out_of_range() {
        let desc = RenderTargetDesc {
            extent: vk::Extent2D {
                width: 4,
                height: 4,
            },
            format: vk::Format::B8G8R8A8_UNORM,
            images: vec![vk::Image::from_raw(1), vk::Image::from_raw(2)],
            image_views: vec![vk::ImageView::from_raw(11), vk::ImageView::from_raw(12)],
        };

        assert_eq!(desc.image_count(), 2);
        assert_eq!(
            desc.get(1),
            Some((vk::Image::from_raw(2), vk::ImageView::from_raw(12)))
        );
        assert_eq!(desc.get(2), None);
    }
}
