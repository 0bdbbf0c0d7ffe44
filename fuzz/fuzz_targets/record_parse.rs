#![no_main]

use facthouse_core::{RequestFact, ServiceEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Record parsing faces the network directly. Malformed JSON, missing
    // fields, hostile path templates and oversized properties must all
    // reject cleanly, never panic.
    let _ = ServiceEvent::parse(data);

    // Anything that parses must survive a canonical round-trip.
    if let Ok(fact) = RequestFact::parse(data) {
        let canonical = fact.to_canonical_json().unwrap();
        let reparsed = RequestFact::parse(&canonical).unwrap();
        assert_eq!(fact, reparsed);
    }
});
