//! Opaque host API handles.
//!
//! The profiler never dereferences a handle, it only uses it as a key. A raw value of zero is the null handle.

macro_rules! define_handles {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
            #[repr(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: Self = Self(0);

                #[inline]
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                #[inline]
                pub const fn as_raw(self) -> u64 {
                    self.0
                }

                #[inline]
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!(stringify!($name), "(0x{:x})"), self.0)
                }
            }

            impl From<$name> for u64 {
                #[inline]
                fn from(handle: $name) -> u64 {
                    handle.0
                }
            }
        )*
    };
}

define_handles!(
    /// Command buffer being recorded by the application.
    CommandBufferHandle,
    /// Graphics or compute pipeline.
    PipelineHandle,
    ShaderModuleHandle,
    RenderPassHandle,
    /// Queue the application submits command buffers to.
    QueueHandle,
    /// Device memory allocation.
    DeviceMemoryHandle,
    ImageHandle,
    /// Timestamp query pool owned by the profiler.
    QueryPoolHandle,
    /// Fence owned by the profiler.
    FenceHandle,
);
