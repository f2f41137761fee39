//! Property-based tests for ffu-core.
//!
//! # Properties Tested
//!
//! - Status bounds hold after every prefix of an output stream
//! - Discovery of N distinct device blocks yields exactly N devices
//! - Line splitting is independent of how the stream is chunked

#![cfg(test)]

use proptest::prelude::*;

use crate::config::DiscoveryConfig;
use crate::discovery::parse_browse_output;
use crate::lines::LineSplitter;
use crate::parser::OutputParser;
use crate::status::StatusRecord;

// =============================================================================
// Generators
// =============================================================================

/// Lines the updater plausibly prints, mixed with noise.
fn arb_output_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9-]{1,12}".prop_map(|d| format!("===== Processing device: {d}")),
        (0.0f64..2000.0, 0.0f64..2000.0, -50.0f64..250.0)
            .prop_map(|(c, t, p)| format!("{c:.1} KiB / {t:.1} KiB [====] {p:.1}%")),
        "[a-z0-9-]{1,12}".prop_map(|d| format!("Flash process completed for {d}")),
        Just("Device already has the current image installed".to_string()),
        Just("Upload completed successfully".to_string()),
        Just("Error: Failed to reset device".to_string()),
        Just("Log file: flash_logs_20240101_120000.log".to_string()),
        "[ -~]{0,40}",
    ]
}

/// Device names as the service browser reports them.
fn arb_device_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("ha-coap-[0-9a-f]{4}", 0..12)
        .prop_map(|names| names.into_iter().collect())
}

// =============================================================================
// Property: status bounds
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_status_bounds_hold_for_every_prefix(
        total in 0u32..6,
        lines in prop::collection::vec(arb_output_line(), 0..60),
    ) {
        let parser = OutputParser::default();
        let mut record = StatusRecord::for_session(total);

        for line in &lines {
            parser.classify(line, &mut record);
            prop_assert!(record.completed_devices <= record.total_devices);
            prop_assert!((0.0..=100.0).contains(&record.upload_progress));
        }
    }
}

// =============================================================================
// Property: discovery count
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_discovery_returns_each_distinct_device(
        names in arb_device_names(),
        repeat_first in any::<bool>(),
    ) {
        let mut output = String::new();
        for (i, name) in names.iter().enumerate() {
            output.push_str(&format!("+  wpan0 IPv6 {name} _ot._udp local\n"));
            output.push_str(&format!("=  wpan0 IPv6 {name} _ot._udp local\n"));
            output.push_str(&format!("   hostname = [{name}.local]\n"));
            output.push_str(&format!("   address = [fd11::{:x}]\n", i + 1));
        }
        if repeat_first {
            if let Some(name) = names.first() {
                output.push_str(&format!("=  wpan0 IPv6 {name} _ot._udp local\n"));
                output.push_str(&format!("   hostname = [{name}.local]\n"));
                output.push_str("   address = [fd11::ffff]\n");
            }
        }

        let devices = parse_browse_output(&output, &DiscoveryConfig::default());
        prop_assert_eq!(devices.len(), names.len());
        for (device, name) in devices.iter().zip(&names) {
            prop_assert_eq!(&device.name, name);
            prop_assert!(!device.address.is_empty());
            prop_assert!(device.selected);
        }
    }
}

// =============================================================================
// Property: chunking independence
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_splitting_ignores_chunk_boundaries(
        text in "[a-z \\r\\n]{0,200}",
        chunk in 1usize..17,
    ) {
        let mut whole = LineSplitter::new();
        let mut expected = whole.push(text.as_bytes());
        expected.extend(whole.finish());

        let mut pieces = LineSplitter::new();
        let mut actual = Vec::new();
        for part in text.as_bytes().chunks(chunk) {
            actual.extend(pieces.push(part));
        }
        actual.extend(pieces.finish());

        prop_assert_eq!(actual, expected);
    }
}
