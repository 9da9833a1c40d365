// Geometry memory
//
// One host-visible, host-coherent allocation backing the triangle's vertex
// buffer. It stays mapped from creation until teardown so each frame can write
// new positions directly.

use super::GraphicsDevice;
use crate::error::{EngineError, Result, VkResultExt};
use crate::geometry::TriangleVertices;
use ash::vk;
use std::ffi::c_void;
use std::ptr::NonNull;

/// Bytes occupied by the triangle's positions
pub const GEOMETRY_SIZE: vk::DeviceSize = std::mem::size_of::<TriangleVertices>() as vk::DeviceSize;

/// Host view of mapped device memory.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// the region is used, and must not be accessed through other pointers
    /// meanwhile.
    pub unsafe fn from_raw(ptr: *mut c_void, len: usize) -> Option<Self> {
        NonNull::new(ptr.cast()).map(|ptr| Self { ptr, len })
    }

    /// Copy `bytes` to the start of the region.
    ///
    /// # Panics
    /// If `bytes` is longer than the region.
    pub fn write(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.len,
            "write of {} bytes into a {} byte mapping",
            bytes.len(),
            self.len
        );
        unsafe {
            self.ptr
                .as_ptr()
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

/// Vertex buffer plus the memory backing it.
pub struct GeometryArena {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: MappedRegion,
}

impl GeometryArena {
    pub fn new(gpu: &GraphicsDevice) -> Result<Self> {
        let device = &gpu.device;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(GEOMETRY_SIZE)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer =
            unsafe { device.create_buffer(&buffer_info, None) }.during("vkCreateBuffer")?;

        match Self::back_buffer(gpu, buffer) {
            Ok((memory, mapped)) => Ok(Self {
                buffer,
                memory,
                mapped,
            }),
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    /// Allocate, bind and map memory for `buffer`.
    fn back_buffer(
        gpu: &GraphicsDevice,
        buffer: vk::Buffer,
    ) -> Result<(vk::DeviceMemory, MappedRegion)> {
        let device = &gpu.device;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        log_memory_layout(&gpu.memory_properties);

        let memory_type_index = pick_memory_type(
            &gpu.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or(EngineError::NoMemoryType)?;

        let heap_index = gpu.memory_properties.memory_types[memory_type_index as usize].heap_index;
        log::info!(
            "Geometry memory: type {}, heap {} ({:.2} MiB), {} bytes",
            memory_type_index,
            heap_index,
            gpu.memory_properties.memory_heaps[heap_index as usize].size as f64 / 1024.0 / 1024.0,
            requirements.size
        );

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory =
            unsafe { device.allocate_memory(&alloc_info, None) }.during("vkAllocateMemory")?;

        let mapped = unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .during("vkBindBufferMemory")
                .and_then(|()| {
                    device
                        .map_memory(memory, 0, GEOMETRY_SIZE, vk::MemoryMapFlags::empty())
                        .during("vkMapMemory")
                })
                .and_then(|ptr| {
                    MappedRegion::from_raw(ptr, GEOMETRY_SIZE as usize).ok_or(
                        EngineError::Vulkan {
                            op: "vkMapMemory",
                            result: vk::Result::ERROR_MEMORY_MAP_FAILED,
                        },
                    )
                })
        };

        match mapped {
            Ok(mapped) => Ok((memory, mapped)),
            Err(e) => {
                unsafe { device.free_memory(memory, None) };
                Err(e)
            }
        }
    }

    /// Overwrite the vertex positions.
    ///
    /// The caller must have waited for every submission reading this buffer.
    pub fn write_vertices(&mut self, vertices: &TriangleVertices) {
        self.mapped.write(bytemuck::cast_slice(vertices));
    }

    /// Unmaps, then destroys the buffer and frees its memory.
    pub fn releaser(&self) -> impl FnOnce(&ash::Device) + 'static {
        let (buffer, memory) = (self.buffer, self.memory);
        move |device| unsafe {
            device.unmap_memory(memory);
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
        }
    }
}

/// Memory type allowed by `type_bits` with all of `required` flags, backed by
/// the largest heap. Ties go to the lowest index.
pub fn pick_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = properties.memory_type_count as usize;
    properties.memory_types[..count]
        .iter()
        .zip(0u32..)
        .filter(|&(memory_type, index)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(memory_type, index)| {
            (index, properties.memory_heaps[memory_type.heap_index as usize].size)
        })
        .fold(None, |best, (index, heap_size)| match best {
            Some((_, best_size)) if best_size >= heap_size => best,
            _ => Some((index, heap_size)),
        })
        .map(|(index, _)| index)
}

fn log_memory_layout(properties: &vk::PhysicalDeviceMemoryProperties) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let heaps = &properties.memory_heaps[..properties.memory_heap_count as usize];
    for (i, heap) in heaps.iter().enumerate() {
        log::debug!(
            "Heap {}: {:.2} MiB, flags {:?}",
            i,
            heap.size as f64 / 1024.0 / 1024.0,
            heap.flags
        );
    }
    let types = &properties.memory_types[..properties.memory_type_count as usize];
    for (i, memory_type) in types.iter().enumerate() {
        log::debug!(
            "Memory type {}: heap {}, flags {:?}",
            i,
            memory_type.heap_index,
            memory_type.property_flags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::triangle_vertices;
    use glam::Vec2;

    fn host() -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    fn properties(
        types: &[(vk::MemoryPropertyFlags, u32)],
        heaps: &[u64],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        for (i, &(flags, heap_index)) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index,
            };
        }
        for (i, &size) in heaps.iter().enumerate() {
            props.memory_heaps[i] = vk::MemoryHeap {
                size,
                flags: vk::MemoryHeapFlags::empty(),
            };
        }
        props.memory_type_count = types.len() as u32;
        props.memory_heap_count = heaps.len() as u32;
        props
    }

    #[test]
    fn prefers_type_on_largest_heap() {
        let props = properties(
            &[
                (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
                (host(), 1),
                (host() | vk::MemoryPropertyFlags::DEVICE_LOCAL, 2),
            ],
            &[8 << 30, 256 << 20, 16 << 30],
        );

        assert_eq!(pick_memory_type(&props, u32::MAX, host()), Some(2));
    }

    #[test]
    fn respects_buffer_type_bits() {
        let props = properties(&[(host(), 0), (host(), 1)], &[1 << 20, 1 << 30]);

        // Type 1 sits on the bigger heap but the buffer only allows type 0
        assert_eq!(pick_memory_type(&props, 0b01, host()), Some(0));
    }

    #[test]
    fn host_visible_alone_is_not_enough() {
        let props = properties(
            &[
                (vk::MemoryPropertyFlags::HOST_VISIBLE, 0),
                (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            ],
            &[1 << 30],
        );

        assert_eq!(pick_memory_type(&props, u32::MAX, host()), None);
    }

    #[test]
    fn equal_heaps_pick_lowest_index() {
        let props = properties(&[(host(), 0), (host(), 0)], &[1 << 30]);
        assert_eq!(pick_memory_type(&props, u32::MAX, host()), Some(0));
    }

    #[test]
    fn entries_past_type_count_are_ignored() {
        let mut props = properties(&[(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0)], &[1 << 30]);
        props.memory_types[1] = vk::MemoryType {
            property_flags: host(),
            heap_index: 0,
        };
        assert_eq!(pick_memory_type(&props, u32::MAX, host()), None);
    }

    #[test]
    fn geometry_is_three_vec2() {
        assert_eq!(GEOMETRY_SIZE, 24);
    }

    #[test]
    fn written_vertices_read_back_identically() {
        // u64 storage keeps the stand-in mapping aligned like device memory
        let mut backing = [0u64; 4];
        let mut region = unsafe {
            MappedRegion::from_raw(backing.as_mut_ptr().cast(), GEOMETRY_SIZE as usize)
        }
        .unwrap();

        let vertices = triangle_vertices(0.25);
        region.write(bytemuck::cast_slice(&vertices));

        assert_eq!(region.as_bytes(), bytemuck::cast_slice::<Vec2, u8>(&vertices));
        let read_back: &[Vec2] = bytemuck::cast_slice(region.as_bytes());
        assert_eq!(read_back, &vertices[..]);
    }

    #[test]
    fn later_write_replaces_earlier_one() {
        let mut backing = [0u64; 4];
        let mut region = unsafe {
            MappedRegion::from_raw(backing.as_mut_ptr().cast(), GEOMETRY_SIZE as usize)
        }
        .unwrap();

        region.write(bytemuck::cast_slice(&triangle_vertices(0.0)));
        let second = triangle_vertices(0.5);
        region.write(bytemuck::cast_slice(&second));

        assert_eq!(region.as_bytes(), bytemuck::cast_slice::<Vec2, u8>(&second));
    }

    #[test]
    #[should_panic(expected = "byte mapping")]
    fn oversized_write_panics() {
        let mut backing = [0u64; 1];
        let mut region =
            unsafe { MappedRegion::from_raw(backing.as_mut_ptr().cast(), 8) }.unwrap();
        region.write(&[0u8; 9]);
    }

    #[test]
    fn null_mapping_is_rejected() {
        assert!(unsafe { MappedRegion::from_raw(std::ptr::null_mut(), 24) }.is_none());
    }
}
