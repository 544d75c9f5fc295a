//! Probing behavior against scripted drivers: binding-base layout, quirk
//! detection, heuristic overrides and transient-object cleanup.

mod common;

use altair_gl::driver::{ShaderStage, StageResources};
use altair_gl::{BaseBindings, Device, QuirkOverrides, RESERVED_UNIFORM_BLOCKS};
use common::FakeProbe;
use pretty_assertions::assert_eq;

#[test]
fn cooperative_driver_probes_clean() {
    common::init_logging();
    let mut gl = FakeProbe::cooperative();
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(device.has_variable_aoffi());
    assert!(!device.has_component_indexing_bug());
    assert!(!device.has_precise_bug());
    assert!(device.has_warp_intrinsics());
    assert!(device.has_shader_ballot());
    assert!(device.has_vertex_viewport_layer());
    assert!(device.has_image_load_formatted());
}

#[test]
fn scalar_limits_are_snapshotted() {
    let mut gl = FakeProbe::cooperative();
    gl.uniform_alignment = 64;
    gl.storage_alignment = 32;
    gl.max_vertex_attributes = 12;
    gl.max_varyings = 24;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert_eq!(device.uniform_buffer_alignment(), 64);
    assert_eq!(device.storage_buffer_alignment(), 32);
    assert_eq!(device.max_vertex_attributes(), 12);
    assert_eq!(device.max_varyings(), 24);
}

#[test]
fn binding_bases_accumulate_stage_capacities() {
    let mut gl = FakeProbe::cooperative();
    gl.stage_resources[ShaderStage::Vertex.index()] = StageResources {
        uniform_buffers: 5,
        storage_buffers: 2,
        samplers: 8,
        images: 1,
    };
    gl.stage_resources[ShaderStage::TessControl.index()] = StageResources {
        uniform_buffers: 3,
        storage_buffers: 1,
        samplers: 4,
        images: 0,
    };
    gl.stage_resources[ShaderStage::TessEval.index()] = StageResources {
        uniform_buffers: 3,
        storage_buffers: 0,
        samplers: 2,
        images: 0,
    };
    gl.stage_resources[ShaderStage::Geometry.index()] = StageResources {
        uniform_buffers: 2,
        storage_buffers: 1,
        samplers: 6,
        images: 2,
    };
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    // The vertex stage starts right after the reserved uniform block; each
    // later stage starts where the previous one ends, with the reservation
    // carved out of every stage's uniform-buffer capacity.
    assert_eq!(
        device.base_bindings(ShaderStage::Vertex),
        BaseBindings {
            uniform_buffer: RESERVED_UNIFORM_BLOCKS,
            shader_storage_buffer: 0,
            sampler: 0,
            image: 0,
        }
    );
    assert_eq!(
        device.base_bindings(ShaderStage::TessControl),
        BaseBindings {
            uniform_buffer: 1 + 4,
            shader_storage_buffer: 2,
            sampler: 8,
            image: 1,
        }
    );
    assert_eq!(
        device.base_bindings(ShaderStage::TessEval),
        BaseBindings {
            uniform_buffer: 5 + 2,
            shader_storage_buffer: 3,
            sampler: 12,
            image: 1,
        }
    );
    assert_eq!(
        device.base_bindings(ShaderStage::Geometry),
        BaseBindings {
            uniform_buffer: 7 + 2,
            shader_storage_buffer: 3,
            sampler: 14,
            image: 1,
        }
    );
    assert_eq!(
        device.base_bindings(ShaderStage::Fragment),
        BaseBindings {
            uniform_buffer: 9 + 1,
            shader_storage_buffer: 4,
            sampler: 20,
            image: 3,
        }
    );
    assert_eq!(
        device.base_bindings(ShaderStage::Compute),
        BaseBindings::default()
    );
}

#[test]
fn warp_intrinsics_require_all_three_extensions() {
    let mut gl = FakeProbe::cooperative();
    gl.extensions.remove("GL_NV_shader_thread_shuffle");
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(!device.has_warp_intrinsics());
    assert!(device.has_shader_ballot());
}

#[test]
fn variable_aoffi_link_failure_disables_feature() {
    let mut gl = FakeProbe::cooperative();
    gl.link_variable_aoffi = false;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(!device.has_variable_aoffi());
    assert!(gl.no_transients_remain());
}

#[test]
fn faulty_component_indexing_is_detected() {
    common::init_logging();
    let mut gl = FakeProbe::cooperative();
    gl.faulty_component_indexing = true;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(device.has_component_indexing_bug());
    assert!(gl.no_transients_remain());
}

#[test]
fn component_indexing_link_failure_assumes_bug() {
    let mut gl = FakeProbe::cooperative();
    gl.link_component_indexing = false;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(device.has_component_indexing_bug());
}

#[test]
fn readback_failure_assumes_bug_without_panicking() {
    let mut gl = FakeProbe::cooperative();
    gl.fail_readback = true;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(device.has_component_indexing_bug());
    assert!(gl.no_transients_remain());
}

#[test]
fn precise_link_failure_sets_bug() {
    let mut gl = FakeProbe::cooperative();
    gl.link_precise = false;
    let device = Device::probe(&mut gl, &QuirkOverrides::default());

    assert!(device.has_precise_bug());
}

#[test]
fn vendor_heuristics_select_quirks() {
    let mut intel = FakeProbe::with_vendor("Intel");
    let device = Device::probe(&mut intel, &QuirkOverrides::default());
    assert!(device.has_broken_compute());
    assert!(!device.has_fast_buffer_sub_data());

    let mut nvidia = FakeProbe::with_vendor("NVIDIA Corporation");
    let device = Device::probe(&mut nvidia, &QuirkOverrides::default());
    assert!(!device.has_broken_compute());
    assert!(device.has_fast_buffer_sub_data());

    let mut other = FakeProbe::with_vendor("Mesa");
    let device = Device::probe(&mut other, &QuirkOverrides::default());
    assert!(!device.has_broken_compute());
    assert!(!device.has_fast_buffer_sub_data());
}

#[test]
fn caller_overrides_beat_vendor_heuristics() {
    let overrides = QuirkOverrides {
        broken_compute: Some(false),
        fast_buffer_sub_data: Some(true),
    };

    let mut intel = FakeProbe::with_vendor("Intel");
    let device = Device::probe(&mut intel, &overrides);
    assert!(!device.has_broken_compute());
    assert!(device.has_fast_buffer_sub_data());
}

#[test]
fn probe_cleans_up_every_transient_object() {
    let mut gl = FakeProbe::cooperative();
    let _device = Device::probe(&mut gl, &QuirkOverrides::default());
    assert!(gl.no_transients_remain());
}
