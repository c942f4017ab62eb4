use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::test_utils::{
    build_container, build_ctab, build_rdef, build_sm3_vertex_shader, CtabConstantSpec,
    RdefVariableSpec,
};
use crate::{
    parse_ctab_chunk, parse_rdef_chunk, parse_token_stream_ctab, token_stream_stage, DxbcError,
    FourCC, ParameterClass, RegisterSet, ShaderContainer, TokenStreamStage,
};

fn sample_rdef() -> Vec<u8> {
    let per_frame = [
        RdefVariableSpec {
            name: "worldViewProj",
            offset: 0,
            size: 64,
            class: 3,
        },
        RdefVariableSpec {
            name: "eyePosition",
            offset: 64,
            size: 16,
            class: 1,
        },
    ];
    let per_object = [RdefVariableSpec {
        name: "world",
        offset: 0,
        size: 64,
        class: 2,
    }];
    build_rdef(&[
        ("PerFrame", 128, &per_frame[..]),
        ("PerObject", 64, &per_object[..]),
    ])
}

#[test]
fn rdef_decodes_buffers_in_slot_order() {
    let rdef = parse_rdef_chunk(&sample_rdef()).unwrap();

    assert_eq!(rdef.shader_model_major(), 4);
    assert_eq!(rdef.creator, None);
    assert_eq!(rdef.constant_buffers.len(), 2);

    let per_frame = &rdef.constant_buffers[0];
    assert_eq!(per_frame.name, "PerFrame");
    assert_eq!(per_frame.size, 128);
    assert_eq!(
        per_frame
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.start_offset, v.size))
            .collect::<Vec<_>>(),
        vec![("worldViewProj", 0, 64), ("eyePosition", 64, 16)]
    );
    assert_eq!(per_frame.variables[0].class, Some(3));
    assert_eq!(per_frame.variables[0].rows, 4);
    assert_eq!(rdef.constant_buffers[1].variables[0].name, "world");
}

#[test]
fn rdef_reports_truncated_variable_table() {
    let mut bytes = sample_rdef();
    // Cut into the variable descriptors.
    bytes.truncate(28 + 2 * 24 + 10);
    assert!(matches!(
        parse_rdef_chunk(&bytes),
        Err(DxbcError::OutOfBounds { .. })
    ));
}

#[test]
fn ctab_decodes_registers_and_classes() {
    let ctab = build_ctab(
        "vs_3_0",
        &[
            CtabConstantSpec {
                name: "matWVP",
                register_index: 0,
                register_count: 4,
                class: 2,
            },
            CtabConstantSpec {
                name: "lightDir",
                register_index: 4,
                register_count: 1,
                class: 1,
            },
        ],
    );

    let table = parse_ctab_chunk(&ctab).unwrap();
    assert_eq!(table.target.as_deref(), Some("vs_3_0"));
    assert_eq!(table.constants.len(), 2);

    let wvp = &table.constants[0];
    assert_eq!(wvp.name, "matWVP");
    assert_eq!(wvp.register_set, RegisterSet::Float4);
    assert_eq!((wvp.register_index, wvp.register_count), (0, 4));
    assert_eq!(wvp.class, ParameterClass::MatrixRows);
    assert!(wvp.class.is_matrix());
    assert_eq!(wvp.default_value, None);

    assert_eq!(table.constants[1].class, ParameterClass::Vector);
    assert_eq!(table.constants[1].register_index, 4);
}

#[test]
fn ctab_unterminated_name_is_an_error() {
    let mut ctab = build_ctab(
        "vs_3_0",
        &[CtabConstantSpec {
            name: "matWVP",
            register_index: 0,
            register_count: 4,
            class: 2,
        }],
    );
    // Drop the final NUL terminator.
    ctab.pop();
    assert!(matches!(
        parse_ctab_chunk(&ctab),
        Err(DxbcError::InvalidChunk { fourcc, .. }) if fourcc == FourCC::CTAB
    ));
}

#[test]
fn container_exposes_rdef_and_ctab_chunks() {
    let rdef = sample_rdef();
    let ctab = build_ctab("ps_2_0", &[]);
    let blob = build_container(&[
        (FourCC::RDEF, rdef.as_slice()),
        (FourCC(*b"SHDR"), &[0u8; 8][..]),
        (FourCC::CTAB, ctab.as_slice()),
    ]);

    let container = ShaderContainer::parse(&blob).unwrap();
    assert_eq!(container.total_size() as usize, blob.len());
    assert_eq!(container.chunks().len(), 3);
    assert_eq!(container.chunks()[1].data.len(), 8);

    let defs = container.resource_definitions().unwrap().unwrap();
    assert_eq!(defs.constant_buffers.len(), 2);

    let table = container.constant_table().unwrap().unwrap();
    assert_eq!(table.target.as_deref(), Some("ps_2_0"));
}

#[test]
fn container_rejects_chunk_running_past_total_size() {
    let mut blob = build_container(&[(FourCC::RDEF, &[1u8, 2, 3, 4][..])]);
    // Chunk size field of the only chunk: header (32) + offset table (4) + fourcc (4).
    blob[40..44].copy_from_slice(&64u32.to_le_bytes());
    assert!(matches!(
        ShaderContainer::parse(&blob),
        Err(DxbcError::MalformedOffsets(_))
    ));
}

#[test]
fn container_rejects_bad_magic_and_short_input() {
    assert!(matches!(
        ShaderContainer::parse(b"DXB"),
        Err(DxbcError::MalformedHeader(_))
    ));
    let mut blob = build_container(&[]);
    blob[0] = b'X';
    assert!(!ShaderContainer::is_container(&blob));
    assert!(matches!(
        ShaderContainer::parse(&blob),
        Err(DxbcError::MalformedHeader(_))
    ));
}

#[test]
fn sm3_token_stream_carries_ctab_comment() {
    let ctab = build_ctab(
        "vs_3_0",
        &[CtabConstantSpec {
            name: "matViewProjection",
            register_index: 8,
            register_count: 4,
            class: 3,
        }],
    );
    let shader = build_sm3_vertex_shader(&ctab);

    assert_eq!(
        token_stream_stage(&shader).unwrap(),
        (TokenStreamStage::Vertex, 3, 0)
    );
    let table = parse_token_stream_ctab(&shader).unwrap().unwrap();
    assert_eq!(table.constants[0].name, "matViewProjection");
    assert_eq!(table.constants[0].register_index, 8);
    assert_eq!(table.constants[0].class, ParameterClass::MatrixColumns);
}

#[test]
fn sm3_token_stream_without_comment_has_no_table() {
    let mut shader = Vec::new();
    shader.extend_from_slice(&0xFFFF_0200u32.to_le_bytes());
    shader.extend_from_slice(&0x0000_FFFFu32.to_le_bytes());
    assert_eq!(
        token_stream_stage(&shader).unwrap().0,
        TokenStreamStage::Pixel
    );
    assert_eq!(parse_token_stream_ctab(&shader).unwrap(), None);

    assert!(matches!(
        token_stream_stage(&0x1234_5678u32.to_le_bytes()),
        Err(DxbcError::BadVersionToken(0x1234_5678))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0x5EED_D8BC),
        .. ProptestConfig::default()
    })]

    #[test]
    fn reflection_parsers_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..=2048)) {
        let _ = parse_rdef_chunk(&bytes);
        let _ = parse_ctab_chunk(&bytes);
        let _ = parse_token_stream_ctab(&bytes);
        let _ = ShaderContainer::parse(&bytes);
    }

    #[test]
    fn truncated_rdef_never_panics(cut in 0usize..400) {
        let bytes = sample_rdef();
        let cut = cut.min(bytes.len());
        let _ = parse_rdef_chunk(&bytes[..cut]);
    }
}
