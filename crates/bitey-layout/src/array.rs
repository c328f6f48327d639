use crate::{Layout, LayoutError, LayoutResolver, LayoutShape};
use bitey_types::TypeDescriptor;

impl LayoutResolver {
    /// Computes layout for a fixed-size array type.
    pub(crate) fn compute_array_layout(&mut self, element: &TypeDescriptor, count: u64) -> Result<Layout, LayoutError> {
        let element_layout = self.resolve(element)?;

        // Calculate stride (size rounded up to alignment)
        let element_align = element_layout.align.max(1);
        let stride = (element_layout.size + element_align - 1) / element_align * element_align;

        let array_type = self.descriptor_to_repc_type(&TypeDescriptor::array_of(element.clone(), count))?;
        let (size, align) = self.size_align_of(&array_type)?;
        debug_assert_eq!(size, stride * count, "C arrays have no padding between elements");

        Ok(Layout {
            size,
            align,
            shape: LayoutShape::Array { element: element_layout, count, stride },
        })
    }
}
