use canarystack_core::{Elem, ErrorSet, HandleState, ProtectionLevel, Stack, StackConfig};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

const LEVELS: [ProtectionLevel; 4] = [
    ProtectionLevel::full(),
    ProtectionLevel::guards_only(),
    ProtectionLevel::hashes_only(),
    ProtectionLevel::none(),
];

fn is_valid_capacity(capacity: usize, min: usize, multiplier: usize) -> bool {
    let mut c = min;
    while c < capacity {
        c *= multiplier;
    }
    c == capacity
}

#[test]
fn deterministic_push_pop_sequences_hold_core_invariants() {
    // Invariant pressure, not a fuzz campaign (that lives in canarystack-fuzz).
    const SEEDS: [u64; 4] = [1, 2, 3, 4];
    const STEPS: usize = 3_000;

    for level in LEVELS {
        for seed in SEEDS {
            let mut rng = XorShift64::new(seed);
            let preset = rng.gen_range_usize(0, 40);
            let config = StackConfig::new(level);
            let mut stack = Stack::with_config(config).unwrap();
            assert!(stack.create(preset).is_empty(), "seed={seed}: create");
            let floor = stack.preset_capacity();

            let mut model: Vec<Elem> = Vec::new();
            let mut pushes = 0usize;
            let mut pops = 0usize;

            for step in 0..STEPS {
                // Drift toward growth in the first half, toward shrink in the second.
                let push_bias = if step < STEPS / 2 { 60 } else { 35 };
                if rng.gen_range_usize(0, 99) < push_bias {
                    let value = rng.next_u64() as Elem;
                    assert!(
                        stack.push(value).is_empty(),
                        "seed={seed} step={step}: push must succeed"
                    );
                    model.push(value);
                    pushes += 1;
                } else {
                    let got = stack.pop_value();
                    match model.pop() {
                        Some(expected) => {
                            assert_eq!(got, Ok(expected), "seed={seed} step={step}: LIFO order");
                            pops += 1;
                        }
                        None => assert_eq!(
                            got,
                            Err(ErrorSet::POP_FROM_EMPTY),
                            "seed={seed} step={step}: pop on empty"
                        ),
                    }
                }

                assert_eq!(stack.size(), pushes - pops, "seed={seed} step={step}: size");
                assert_eq!(stack.live(), model, "seed={seed} step={step}: contents");
                assert!(
                    stack.verify().is_empty(),
                    "seed={seed} step={step}: verify after op"
                );
                let capacity = stack.capacity();
                if capacity > 0 {
                    assert!(capacity >= stack.size(), "seed={seed} step={step}: size <= cap");
                    assert!(capacity >= floor, "seed={seed} step={step}: floor");
                    assert!(
                        is_valid_capacity(capacity, 8, 2),
                        "seed={seed} step={step}: capacity {capacity} off the growth ladder"
                    );
                } else {
                    assert_eq!(stack.size(), 0, "seed={seed} step={step}: empty without buffer");
                }
            }

            assert!(stack.destroy().is_empty(), "seed={seed}: destroy");
            assert_eq!(stack.state(), HandleState::Destroyed);
        }
    }
}

#[test]
fn capacity_after_n_pushes_is_smallest_ladder_step() {
    let config = StackConfig::default();
    for n in 1..=300 {
        let mut stack = Stack::with_config(config).unwrap();
        stack.create(0);
        for v in 0..n {
            stack.push(v as Elem);
        }
        assert_eq!(
            stack.capacity(),
            config.initial_capacity(n),
            "n={n}: capacity after pushes"
        );
    }
}

#[test]
fn verify_is_idempotent() {
    let mut stack = Stack::new();
    stack.create(3);
    for v in 0..20 {
        stack.push(v);
    }
    let first = stack.verify();
    let snap = stack.snapshot();
    assert_eq!(stack.verify(), first);
    assert_eq!(stack.snapshot(), snap);

    stack.tamper().set_size(1_000);
    let damaged = stack.verify();
    assert!(!damaged.is_empty());
    assert_eq!(stack.verify(), damaged);
}

#[test]
fn pop_on_empty_changes_nothing_at_every_level() {
    for level in LEVELS {
        for preset in [0, 5, 64] {
            let mut stack = Stack::with_config(StackConfig::new(level)).unwrap();
            stack.create(preset);
            let before = stack.snapshot();
            let mut out: Elem = 1234;
            assert_eq!(
                stack.pop(Some(&mut out)),
                ErrorSet::POP_FROM_EMPTY,
                "level={} preset={preset}",
                level.label()
            );
            assert_eq!(out, 1234);
            assert_eq!(stack.snapshot(), before, "level={} preset={preset}", level.label());
        }
    }
}

#[test]
fn push_pop_round_trip_across_boundaries() {
    let mut stack = Stack::new();
    stack.create(0);
    let values: Vec<Elem> = (0..1_000).map(|v| v * 7 - 300).collect();
    for &v in &values {
        assert!(stack.push(v).is_empty());
    }
    assert_eq!(stack.capacity(), 1024);
    for &v in values.iter().rev() {
        assert_eq!(stack.pop_value(), Ok(v));
    }
    assert_eq!(stack.capacity(), 8);
    assert!(stack.is_empty());
}

#[test]
fn shrink_stops_at_larger_of_floor_and_minimum() {
    let config = StackConfig::default().with_min_capacity(4).with_growth_multiplier(3);
    let mut stack = Stack::with_config(config).unwrap();
    stack.create(10);
    assert_eq!(stack.capacity(), 12);
    for v in 0..200 {
        stack.push(v);
    }
    assert_eq!(stack.capacity(), 324);
    while stack.pop_value().is_ok() {}
    assert_eq!(stack.capacity(), 12);
    assert!(stack.verify().is_empty());
}

#[test]
fn scenario_preset_ten_yields_sixteen() {
    let mut stack = Stack::with_config(StackConfig::default()).unwrap();
    assert!(stack.create(10).is_empty());
    assert_eq!(stack.capacity(), 16);
    assert_eq!(stack.size(), 0);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    assert!(Stack::with_config(StackConfig::default().with_growth_multiplier(1)).is_err());
    assert!(Stack::with_config(StackConfig::default().with_min_capacity(0)).is_err());
}
