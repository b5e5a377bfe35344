//! End-to-end lifecycle tests against the stub engine module.
//!
//! The stub (tests/stub_engine.wat) speaks the same ABI as the real engine
//! build but decodes deterministic two-byte "instructions", which is all the
//! marshaling layer needs to be exercised end to end.

use wasmstone::{Architecture, Engine, Error, Mode, OptionKind, OptionValue};

const STUB_ENGINE: &str = include_str!("stub_engine.wat");

fn engine() -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(STUB_ENGINE.as_bytes()).expect("stub engine should instantiate")
}

#[test]
fn create_and_free_an_instance() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();
    assert!(instance.valid());
    assert_eq!(instance.architecture(), Architecture::Arm);
    engine.free_instance(&mut instance);
    assert!(!instance.valid());
}

#[test]
fn create_and_free_an_instance_a_second_time() {
    let engine = engine();
    let mut first = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();
    engine.free_instance(&mut first);
    let mut second = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();
    engine.free_instance(&mut second);
}

#[test]
fn streaming_decode_walks_the_whole_buffer() {
    let engine = engine();
    let mut instance = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();

    let code = hex::decode("4ff00001bde80088").unwrap();
    let insns = instance.disassemble(&code, 0x1000).unwrap();

    assert_eq!(insns.len(), 4);
    for (i, insn) in insns.iter().enumerate() {
        assert_eq!(insn.address, 0x1000 + 2 * i as u64);
        assert_eq!(insn.size, 2);
        assert_eq!(insn.id, code[2 * i] as u32);
        assert_eq!(insn.mnemonic, "mock");
        assert_eq!(insn.operands, "r0");
    }

    // Addresses are non-decreasing and the byte spans, concatenated in
    // order, reconstruct the input exactly.
    assert!(insns.windows(2).all(|w| w[0].address <= w[1].address));
    let recombined: Vec<u8> = insns.iter().flat_map(|i| i.bytes.clone()).collect();
    assert_eq!(recombined, code);
}

#[test]
fn decoding_stops_at_undecodable_bytes() {
    let engine = engine();
    let mut instance = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();

    // 0xff at the cursor is undecodable for the stub; trailing bytes drop.
    let code = [0x4f, 0xf0, 0xff, 0x01, 0xbd, 0xe8];
    let insns = instance.disassemble(&code, 0).unwrap();

    assert_eq!(insns.len(), 1);
    let recombined: Vec<u8> = insns.iter().flat_map(|i| i.bytes.clone()).collect();
    assert_eq!(recombined, &code[..2]);
}

#[test]
fn empty_input_yields_empty_sequence() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::X86).unwrap();
    assert!(instance.disassemble(&[], 0).unwrap().is_empty());
    // A trailing fragment smaller than one instruction decodes to nothing.
    assert!(instance.disassemble(&[0x90], 0).unwrap().is_empty());
}

#[test]
fn addresses_survive_the_full_64_bit_range() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Arm64).unwrap();

    let base = 0x8000_0000_0000_0000u64;
    let insns = instance.disassemble(&[0x00, 0x01, 0x02, 0x03], base).unwrap();
    assert_eq!(insns.len(), 2);
    assert_eq!(insns[0].address, base);
    assert_eq!(insns[1].address, base + 2);
}

#[test]
fn instance_state_does_not_leak_between_calls() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Mips).unwrap();

    let first = instance.disassemble(&[0x10, 0x20, 0x30, 0x40], 0).unwrap();
    let second = instance.disassemble(&[0x50, 0x60], 0x2000).unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].address, 0x2000);
    assert_eq!(second[0].bytes, vec![0x50, 0x60]);
}

#[test]
fn two_instances_share_the_engine() {
    let engine = engine();
    let mut arm = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();
    let mut x86 = engine.create_instance(Architecture::X86, Mode::BITS_64).unwrap();

    assert_eq!(arm.disassemble(&[1, 2, 3, 4], 0).unwrap().len(), 2);
    assert_eq!(x86.disassemble(&[5, 6], 0).unwrap().len(), 1);
    assert_eq!(arm.disassemble(&[7, 8], 0x40).unwrap().len(), 1);

    engine.free_instance(&mut arm);
    engine.free_instance(&mut x86);
}

#[test]
fn use_after_free_is_rejected() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();
    engine.free_instance(&mut instance);

    let err = instance.disassemble(&[0x00, 0xbf], 0).unwrap_err();
    assert!(matches!(err, Error::UseAfterFree));
    let err = instance.set_option(OptionKind::Syntax, OptionValue::SYNTAX_INTEL).unwrap_err();
    assert!(matches!(err, Error::UseAfterFree));

    // Freeing twice is deliberately a no-op.
    engine.free_instance(&mut instance);
    instance.free();
}

#[test]
fn dropping_an_instance_releases_it() {
    let engine = engine();
    {
        let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();
        let _ = instance.disassemble(&[0x11, 0x22], 0).unwrap();
    }
    // The engine is still healthy after the implicit free.
    let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();
    assert_eq!(instance.disassemble(&[0x33, 0x44], 0).unwrap().len(), 1);
    engine.free_instance(&mut instance);
}

#[test]
fn unsupported_mode_surfaces_the_open_status() {
    let engine = engine();
    // Bit 30 is rejected by the stub with status 5.
    let err = engine
        .create_instance(Architecture::Arm, Mode::from_bits_retain(1 << 30))
        .unwrap_err();
    assert!(matches!(err, Error::Open(5)));
}

#[test]
fn set_option_succeeds_on_a_live_instance() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::X86).unwrap();
    instance.set_option(OptionKind::Syntax, OptionValue::SYNTAX_ATT).unwrap();
    engine.free_instance(&mut instance);
}

#[test]
fn exhausted_foreign_heap_is_an_allocation_failure() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();

    // The stub's memory is 96 pages (6 MiB); a 7 MiB code buffer cannot be
    // allocated and the null offset must not be freed.
    let oversized = vec![0u8; 7 * 1024 * 1024];
    let err = instance.disassemble(&oversized, 0).unwrap_err();
    assert!(matches!(err, Error::Allocation(_)));

    // The failure left the instance and allocator usable.
    assert_eq!(instance.disassemble(&[0x01, 0x02], 0).unwrap().len(), 1);
    engine.free_instance(&mut instance);
}

#[test]
fn oversized_input_cannot_truncate_the_allocation_size() {
    let engine = engine();
    let mut instance = engine.create_instance_default(Architecture::Arm).unwrap();

    // A few bytes past u32::MAX: a blind 32-bit cast would request a tiny
    // allocation and then copy 4 GiB into it. Must fail cleanly instead.
    let oversized = vec![0u8; u32::MAX as usize + 3];
    let err = instance.disassemble(&oversized, 0).unwrap_err();
    assert!(matches!(err, Error::Allocation(_)));
    drop(oversized);

    // The failure happened before any foreign call; the engine and the
    // instance both stay usable.
    assert_eq!(instance.disassemble(&[0x01, 0x02], 0).unwrap().len(), 1);
    engine.free_instance(&mut instance);
}

#[test]
fn engine_and_instance_have_debug_output() {
    let engine = engine();
    let instance = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();

    assert!(format!("{engine:?}").contains("Engine"));
    let repr = format!("{instance:?}");
    assert!(repr.contains("Instance"));
    assert!(repr.contains("Arm"));
}

#[test]
fn detail_is_absent_by_default() {
    let engine = engine();
    let mut instance = engine.create_instance(Architecture::Arm, Mode::THUMB).unwrap();
    let insns = instance.disassemble(&[0x4f, 0xf0], 0).unwrap();
    assert!(insns.iter().all(|i| i.detail.is_none()));
}

#[test]
fn garbage_module_bytes_fail_to_load() {
    let err = Engine::new(b"definitely not a wasm module").unwrap_err();
    assert!(matches!(err, Error::Load(_)));
}
