//! Registry of built-in WGSL sources, grounded on `aero-gpu`'s
//! `shader_lib` module (see `aero-gpu/tests/shader_validation.rs`, which
//! iterates `BuiltinShader::ALL` and parses each one with `naga`). Keeping
//! the WGSL text behind `include_str!` instead of scattered literal strings
//! means both the pipeline cache and the validation tests read the exact
//! bytes that ship in the binary.

/// One entry per `.wgsl` file under `src/gpu/shaders/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinShader {
    GrayscalePack,
    GaussianBlur,
    Downsample,
    Dog,
    Extremum,
    IndirectDispatch,
    Orientation,
    Descriptor,
    Matcher,
}

impl BuiltinShader {
    pub const ALL: &'static [BuiltinShader] = &[
        BuiltinShader::GrayscalePack,
        BuiltinShader::GaussianBlur,
        BuiltinShader::Downsample,
        BuiltinShader::Dog,
        BuiltinShader::Extremum,
        BuiltinShader::IndirectDispatch,
        BuiltinShader::Orientation,
        BuiltinShader::Descriptor,
        BuiltinShader::Matcher,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BuiltinShader::GrayscalePack => "grayscale_pack",
            BuiltinShader::GaussianBlur => "gaussian_blur",
            BuiltinShader::Downsample => "downsample",
            BuiltinShader::Dog => "dog",
            BuiltinShader::Extremum => "extremum",
            BuiltinShader::IndirectDispatch => "indirect_dispatch",
            BuiltinShader::Orientation => "orientation",
            BuiltinShader::Descriptor => "descriptor",
            BuiltinShader::Matcher => "matcher",
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            BuiltinShader::GrayscalePack => include_str!("shaders/grayscale_pack.wgsl"),
            BuiltinShader::GaussianBlur => include_str!("shaders/gaussian_blur.wgsl"),
            BuiltinShader::Downsample => include_str!("shaders/downsample.wgsl"),
            BuiltinShader::Dog => include_str!("shaders/dog.wgsl"),
            BuiltinShader::Extremum => include_str!("shaders/extremum.wgsl"),
            BuiltinShader::IndirectDispatch => include_str!("shaders/indirect_dispatch.wgsl"),
            BuiltinShader::Orientation => include_str!("shaders/orientation.wgsl"),
            BuiltinShader::Descriptor => include_str!("shaders/descriptor.wgsl"),
            BuiltinShader::Matcher => include_str!("shaders/matcher.wgsl"),
        }
    }

    pub fn hash(self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.wgsl().as_bytes())
    }
}
