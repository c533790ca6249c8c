//! Parses and validates every built-in WGSL source at test time, so a typo
//! in a `.wgsl` file fails fast in CI rather than surfacing as an opaque
//! `wgpu` panic on first dispatch.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::gpu::shader_lib::BuiltinShader;

#[test]
fn builtin_shaders_are_valid_wgsl() {
    for shader in BuiltinShader::ALL {
        let module = naga::front::wgsl::parse_str(shader.wgsl())
            .unwrap_or_else(|e| panic!("{} failed to parse: {e}", shader.label()));

        let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
        validator
            .validate(&module)
            .unwrap_or_else(|e| panic!("{} failed validation: {e}", shader.label()));
    }
}

#[test]
fn every_shader_declares_a_compute_entry_point() {
    for shader in BuiltinShader::ALL {
        let module = naga::front::wgsl::parse_str(shader.wgsl()).unwrap();
        let has_compute_entry = module
            .entry_points
            .iter()
            .any(|ep| ep.stage == naga::ShaderStage::Compute);
        assert!(has_compute_entry, "{} declares no compute entry point", shader.label());
    }
}
