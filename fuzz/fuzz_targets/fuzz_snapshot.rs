#![no_main]

use bastion::Snapshot;
use bastion::game::check_invariants;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(snapshot) = Snapshot::from_json(text) else {
        return;
    };
    // Large grids only cost memory
    if snapshot.map_size > 128 {
        return;
    }

    // Whatever parses must either be rejected or repaired into a sound world
    if let Ok(restored) = snapshot.restore() {
        let violations = check_invariants(&restored.state);
        assert!(violations.is_empty(), "{violations:?} after {:?}", restored.repairs);
    }
});
