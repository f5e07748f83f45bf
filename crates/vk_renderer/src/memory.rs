//! GPU memory allocation service
//!
//! One allocation per resource, bound immediately after allocation. The
//! allocator deliberately does no pooling or sub-allocation; sharing one
//! allocation across resources is future work, not a supported mode.

use ash::{vk, Device, Instance};

use crate::context::{VulkanError, VulkanResult};

/// Find the first memory type satisfying both the resource's type bitmask
/// and the requested property flags.
///
/// Enumeration order decides ties; there is no scoring. A miss is a
/// configuration error the renderer cannot recover from.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..memory_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}

/// A GPU object that owns exactly one backing allocation
///
/// Buffers and images share the allocate-then-bind protocol but use
/// different entry points for requirements and binding; this trait is the
/// seam between them.
pub trait MemoryBacked {
    /// Query size/alignment/type-bitmask requirements for this handle
    fn memory_requirements(&self, device: &Device) -> vk::MemoryRequirements;

    /// Bind an allocation to this handle at offset zero
    fn bind_memory(&self, device: &Device, memory: vk::DeviceMemory) -> VulkanResult<()>;
}

impl MemoryBacked for vk::Buffer {
    fn memory_requirements(&self, device: &Device) -> vk::MemoryRequirements {
        unsafe { device.get_buffer_memory_requirements(*self) }
    }

    fn bind_memory(&self, device: &Device, memory: vk::DeviceMemory) -> VulkanResult<()> {
        unsafe {
            device.bind_buffer_memory(*self, memory, 0)
                .map_err(VulkanError::Api)
        }
    }
}

impl MemoryBacked for vk::Image {
    fn memory_requirements(&self, device: &Device) -> vk::MemoryRequirements {
        unsafe { device.get_image_memory_requirements(*self) }
    }

    fn bind_memory(&self, device: &Device, memory: vk::DeviceMemory) -> VulkanResult<()> {
        unsafe {
            device.bind_image_memory(*self, memory, 0)
                .map_err(VulkanError::Api)
        }
    }
}

/// Memory allocator bound to one physical device
///
/// Caches the device's memory properties once; every resource creation in
/// the crate goes through [`MemoryAllocator::allocate_and_bind`].
pub struct MemoryAllocator {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl MemoryAllocator {
    /// Create an allocator for the given physical device
    pub fn new(instance: &Instance, physical_device: vk::PhysicalDevice) -> Self {
        let memory_properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };
        Self { memory_properties }
    }

    /// Allocate backing memory for a resource and bind it
    ///
    /// The allocation is sized to the handle's own requirement query, never
    /// to the caller's requested size (drivers may pad for alignment).
    pub fn allocate_and_bind<R: MemoryBacked>(
        &self,
        device: &Device,
        resource: &R,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = resource.memory_requirements(device);
        let memory_type_index =
            find_memory_type(&self.memory_properties, requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device.allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };

        resource.bind_memory(device, memory)?;
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties_with(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn test_find_memory_type_first_match_wins() {
        let props = properties_with(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Both type 1 and type 2 qualify; enumeration order picks 1
        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_find_memory_type_respects_type_bitmask() {
        let props = properties_with(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 is masked out by the resource's requirements
        let index = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_find_memory_type_superset_properties_match() {
        let props = properties_with(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // A type with extra properties still satisfies the mask
        let index = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn test_find_memory_type_no_match_is_fatal() {
        // Host-visible staging request against a device with only
        // device-local memory in the permitted types
        let props = properties_with(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let result = find_memory_type(
            &props,
            0b01,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
