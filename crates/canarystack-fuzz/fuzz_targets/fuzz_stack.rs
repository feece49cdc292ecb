#![no_main]
use canarystack_core::{ErrorSet, ProtectionLevel, Stack, StackConfig};
use libfuzzer_sys::fuzz_target;

// Byte 0 picks the protection level, byte 1 the preset. The rest is read in
// pairs of (op, value). Without tampering, every reachable state must verify
// clean and the stack must track a plain Vec.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let level = match data[0] % 4 {
        0 => ProtectionLevel::full(),
        1 => ProtectionLevel::guards_only(),
        2 => ProtectionLevel::hashes_only(),
        _ => ProtectionLevel::none(),
    };
    let Ok(mut stack) = Stack::with_config(StackConfig::new(level.with_diagnostics(false))) else {
        return;
    };
    assert!(stack.create(usize::from(data[1])).is_empty());

    let mut model: Vec<i32> = Vec::new();
    for chunk in data[2..].chunks(2) {
        let value = i32::from(*chunk.get(1).unwrap_or(&0));
        match chunk[0] % 4 {
            0 | 1 => {
                assert!(stack.push(value).is_empty());
                model.push(value);
            }
            2 => {
                let mut out = 0;
                let errors = stack.pop(Some(&mut out));
                match model.pop() {
                    Some(want) => {
                        assert!(errors.is_empty());
                        assert_eq!(out, want);
                    }
                    None => assert_eq!(errors, ErrorSet::POP_FROM_EMPTY),
                }
            }
            _ => assert!(stack.verify().is_empty()),
        }
        assert_eq!(stack.size(), model.len());
        assert!(stack.capacity() >= stack.size());
    }

    assert!(stack.destroy().is_empty());
    assert_eq!(stack.destroy(), ErrorSet::DOUBLE_DESTROY);
});
