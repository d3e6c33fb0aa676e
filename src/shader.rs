//! Stable identification of pipelines by the shaders they are made of.

use crate::ShaderModuleHandle;

/// Hashes shader module bytecode into a stable 32-bit fingerprint.
#[inline]
pub const fn compute_module_hash(bytecode: &[u8]) -> u32 {
    const_fnv1a_hash::fnv1a_hash_32(bytecode, None)
}

/// Hash folded into a stage's module hash so that different entry points of one module are told apart.
#[inline]
pub const fn hash_entry_point(name: &str) -> u32 {
    const_fnv1a_hash::fnv1a_hash_str_32(name)
}

/// Single shader stage bit, using the host API's bit values.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStage(pub u32);

impl ShaderStage {
    pub const VERTEX: Self = Self(0x1);
    pub const TESSELLATION_CONTROL: Self = Self(0x2);
    pub const TESSELLATION_EVALUATION: Self = Self(0x4);
    pub const GEOMETRY: Self = Self(0x8);
    pub const FRAGMENT: Self = Self(0x10);
    pub const COMPUTE: Self = Self(0x20);
}

impl std::fmt::Debug for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::VERTEX => f.write_str("VERTEX"),
            Self::TESSELLATION_CONTROL => f.write_str("TESSELLATION_CONTROL"),
            Self::TESSELLATION_EVALUATION => f.write_str("TESSELLATION_EVALUATION"),
            Self::GEOMETRY => f.write_str("GEOMETRY"),
            Self::FRAGMENT => f.write_str("FRAGMENT"),
            Self::COMPUTE => f.write_str("COMPUTE"),
            Self(bits) => write!(f, "ShaderStage(0x{bits:x})"),
        }
    }
}

/// One shader stage of a pipeline create call.
#[derive(Clone, Copy, Debug)]
pub struct ShaderStageInfo<'a> {
    pub stage: ShaderStage,
    pub module: ShaderModuleHandle,
    pub entry_point: &'a str,
}

/// Per-stage shader hashes of a pipeline plus an aggregate hash over all of them.
///
/// Unused stages are zero. Graphics pipelines fill the first five slots, compute pipelines only `comp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderTuple {
    pub vert: u32,
    pub tesc: u32,
    pub tese: u32,
    pub geom: u32,
    pub frag: u32,
    pub comp: u32,
    pub hash: u32,
}

impl ShaderTuple {
    pub const EMPTY: Self = Self {
        vert: 0,
        tesc: 0,
        tese: 0,
        geom: 0,
        frag: 0,
        comp: 0,
        hash: 0,
    };

    /// Short label in the form `VS=........,PS=........`, or `CS=........` for compute pipelines.
    pub fn label(&self) -> String {
        if self.comp != 0 {
            format!("CS={:08x}", self.comp)
        } else {
            format!("VS={:08x},PS={:08x}", self.vert, self.frag)
        }
    }

    fn stage_hashes_as_bytes(&self) -> [u8; 24] {
        let mut bytes = [0; 24];
        let stages = [self.vert, self.tesc, self.tese, self.geom, self.frag, self.comp];
        for (chunk, stage) in bytes.chunks_exact_mut(4).zip(stages) {
            chunk.copy_from_slice(&stage.to_le_bytes());
        }
        bytes
    }
}

/// Builds the shader tuple of a pipeline.
///
/// `module_hash` looks up the bytecode hash of a registered shader module. Modules it doesn't know contribute zero.
///
/// Stage bits other than the six known ones violate the host API contract: this asserts in debug builds and drops the stage
/// in release builds, since hashing must never take the application down.
pub fn compute_shader_tuple(
    stages: &[ShaderStageInfo<'_>],
    module_hash: impl Fn(ShaderModuleHandle) -> Option<u32>,
) -> ShaderTuple {
    let mut tuple = ShaderTuple::default();

    for stage in stages {
        let module = module_hash(stage.module).unwrap_or_else(|| {
            log::warn!("Shader module {:?} is not registered", stage.module);
            0
        });
        let hash = module ^ hash_entry_point(stage.entry_point);

        match stage.stage {
            ShaderStage::VERTEX => tuple.vert = hash,
            ShaderStage::TESSELLATION_CONTROL => tuple.tesc = hash,
            ShaderStage::TESSELLATION_EVALUATION => tuple.tese = hash,
            ShaderStage::GEOMETRY => tuple.geom = hash,
            ShaderStage::FRAGMENT => tuple.frag = hash,
            ShaderStage::COMPUTE => tuple.comp = hash,
            unsupported => {
                debug_assert!(false, "Unsupported shader stage {unsupported:?}");
                log::error!("Dropping unsupported shader stage {unsupported:?} from the shader tuple");
            }
        }
    }

    tuple.hash = compute_module_hash(&tuple.stage_hashes_as_bytes());
    tuple
}
