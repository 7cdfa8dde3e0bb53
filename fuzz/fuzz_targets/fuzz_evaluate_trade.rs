#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use vault_engine::evaluate;

#[derive(Arbitrary, Debug)]
struct TradeInput {
    total: u64,
    requested: u64,
    floor: u64,
    reserve: u64,
}

fuzz_target!(|input: TradeInput| {
    let verdict = evaluate(input.total, input.requested, input.floor, input.reserve);

    assert!(verdict.actual_amount <= input.total);
    if input.total < input.floor {
        assert!(!verdict.can_execute);
        assert_eq!(verdict.actual_amount, 0);
    } else {
        assert!(verdict.can_execute);
        if input.requested <= input.total {
            assert_eq!(verdict.actual_amount, input.requested);
        } else {
            assert!(verdict.actual_amount >= input.floor.min(input.total));
        }
    }
});
