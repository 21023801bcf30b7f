//! Whole-pack verification.

use std::collections::HashMap;

use serde_json::Value;

use crate::canon::digest;
use crate::chain::{replay, GENESIS};
use crate::checkpoints::{check_link, check_payload, check_signature, SignatureCheck};
use crate::keys::TrustedKeys;
use crate::report::Report;

pub const PACK_FORMAT: &str = "auditchain.forensic-pack/v1";

fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(Value::as_u64)
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Verify every part of `pack` that can be checked without the live service.
///
/// Checks run in order and stop at the first failure.
pub fn verify_pack(pack: &Value, keys: &TrustedKeys) -> Report {
    let mut report = Report::new();
    // `None` means a check failed and the run stopped there.
    let _ = run_checks(pack, keys, &mut report);

    tracing::info!(
        passed = report.passed(),
        checks = report.checks.len(),
        "pack verification finished"
    );
    report
}

/// `Some(())` while every recorded check has passed or been skipped.
fn still_passing(report: &Report) -> Option<()> {
    report.passed().then_some(())
}

fn run_checks(pack: &Value, keys: &TrustedKeys, report: &mut Report) -> Option<()> {
    check_format(pack, report);
    still_passing(report)?;
    check_pack_hash(pack, report);
    still_passing(report)?;

    let events: &[Value] = pack
        .get("events")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice);
    let from_seq = u64_at(pack, "/segment/fromSeq").unwrap_or(1);
    let to_seq = u64_at(pack, "/segment/toSeq").unwrap_or(0);

    check_segment(pack, events, from_seq, to_seq, report);
    still_passing(report)?;
    let last_verified = check_chain(events, from_seq, report);
    still_passing(report)?;
    check_head(pack, from_seq, to_seq, last_verified, report);
    still_passing(report)?;
    check_checkpoints(pack, events, from_seq, to_seq, keys, report)
}

fn check_format(pack: &Value, report: &mut Report) {
    match pack.get("format").and_then(Value::as_str) {
        Some(PACK_FORMAT) => report.pass("format", PACK_FORMAT),
        other => report.fail(
            "format",
            format!("expected {PACK_FORMAT}, found {}", other.unwrap_or("nothing")),
            None,
        ),
    }
}

fn check_pack_hash(pack: &Value, report: &mut Report) {
    let Some(stored) = pack.get("packHash").and_then(Value::as_str) else {
        report.fail("pack hash", "packHash missing", None);
        return;
    };
    let mut body = pack.clone();
    if let Some(map) = body.as_object_mut() {
        map.remove("packHash");
    }
    match digest(&body) {
        Ok(recomputed) if recomputed == stored => report.pass("pack hash", recomputed),
        Ok(recomputed) => report.fail(
            "pack hash",
            format!("expected {recomputed}, found {stored}"),
            None,
        ),
        Err(err) => report.fail("pack hash", format!("pack is not canonicalizable: {err}"), None),
    }
}

fn check_segment(pack: &Value, events: &[Value], from_seq: u64, to_seq: u64, report: &mut Report) {
    let declared = u64_at(pack, "/segment/count");
    let first = events.first().and_then(|e| e.get("seq")).and_then(Value::as_u64);
    let last = events.last().and_then(|e| e.get("seq")).and_then(Value::as_u64);

    if declared != Some(events.len() as u64) {
        report.fail(
            "segment",
            format!(
                "segment count {} but pack holds {} events",
                declared.map_or_else(|| "missing".to_string(), |c| c.to_string()),
                events.len()
            ),
            None,
        );
    } else if !events.is_empty() && last != Some(to_seq) {
        report.fail(
            "segment",
            format!(
                "segment ends at {to_seq} but last event is {}",
                last.map_or_else(|| "unreadable".to_string(), |s| s.to_string())
            ),
            last.map(|s| s + 1),
        );
    } else if events.is_empty() && from_seq <= to_seq {
        report.fail(
            "segment",
            format!("segment {from_seq}..{to_seq} holds no events"),
            Some(from_seq),
        );
    } else {
        let range = match (first, last) {
            (Some(first), Some(last)) => format!("seq {first}..{last}"),
            _ => "empty".to_string(),
        };
        report.pass("segment", format!("{} events, {range}", events.len()));
    }
}

/// Replay the events; returns the last verified `(seq, hash)`.
fn check_chain(events: &[Value], from_seq: u64, report: &mut Report) -> Option<(u64, String)> {
    let expected_prev = (from_seq == 1).then(|| GENESIS.to_string());
    let replay = replay(events, from_seq, expected_prev);
    match &replay.failure {
        Some(failure) => report.fail("event chain", failure.to_string(), Some(failure.seq)),
        None => report.pass("event chain", format!("{} events linked", replay.checked)),
    }
    replay.last
}

fn check_head(
    pack: &Value,
    from_seq: u64,
    to_seq: u64,
    last_verified: Option<(u64, String)>,
    report: &mut Report,
) {
    let head_seq = u64_at(pack, "/headAtExportTime/lastSeq");
    let head_hash = str_at(pack, "/headAtExportTime/lastHash");
    let (Some(head_seq), Some(head_hash)) = (head_seq, head_hash) else {
        report.fail("head", "headAtExportTime missing", None);
        return;
    };

    if from_seq != 1 || to_seq != head_seq {
        report.skip(
            "head",
            format!("segment {from_seq}..{to_seq} does not span the chain to {head_seq}"),
        );
        return;
    }

    let (seq, hash) = last_verified.unwrap_or((0, GENESIS.to_string()));
    if seq == head_seq && hash == head_hash {
        report.pass("head", format!("{head_seq}:{head_hash}"));
    } else {
        report.fail(
            "head",
            format!("head_mismatch: expected {head_seq}:{head_hash}, found {seq}:{hash}"),
            Some(head_seq),
        );
    }
}

fn check_checkpoints(
    pack: &Value,
    events: &[Value],
    from_seq: u64,
    to_seq: u64,
    keys: &TrustedKeys,
    report: &mut Report,
) -> Option<()> {
    let checkpoints: &[Value] = pack
        .get("checkpoints")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice);
    if checkpoints.is_empty() {
        report.skip("checkpoints", "pack holds no checkpoints");
        return Some(());
    }

    let event_hashes: HashMap<u64, &str> = events
        .iter()
        .filter_map(|e| Some((e.get("seq")?.as_u64()?, e.get("hash")?.as_str()?)))
        .collect();

    let mut previous: Option<&Value> = None;
    for checkpoint in checkpoints {
        let id = checkpoint.get("id").and_then(Value::as_str).unwrap_or("?");
        let seq = checkpoint.get("seq").and_then(Value::as_u64);
        let name = format!("checkpoint {id}");

        match check_signature(checkpoint, keys) {
            SignatureCheck::Valid { key_id } => {
                report.pass(format!("{name} signature"), format!("key {key_id}"))
            }
            SignatureCheck::Skipped => {
                report.skip(format!("{name} signature"), "no public key supplied")
            }
            SignatureCheck::UnknownKey { key_id } => report.fail(
                format!("{name} signature"),
                format!("unverifiable: key {key_id} not in the supplied keys"),
                seq,
            ),
            SignatureCheck::Invalid { key_id } => report.fail(
                format!("{name} signature"),
                format!("bad signature for key {key_id}"),
                seq,
            ),
        }
        still_passing(report)?;

        let integrity = check_payload(checkpoint)
            .map_err(|e| format!("payload_mismatch: {e}"))
            .and_then(|()| check_event_hash(checkpoint, seq, &event_hashes, from_seq, to_seq))
            .and_then(|()| check_link(checkpoint, previous).map_err(|e| format!("chain_mismatch: {e}")));
        match integrity {
            Ok(()) => report.pass(
                name,
                format!("seq {}", seq.map_or_else(|| "?".to_string(), |s| s.to_string())),
            ),
            Err(detail) => report.fail(name, detail, seq),
        }
        still_passing(report)?;

        previous = Some(checkpoint);
    }
    Some(())
}

/// Checkpoints inside the segment must carry the hash of their event.
fn check_event_hash(
    checkpoint: &Value,
    seq: Option<u64>,
    event_hashes: &HashMap<u64, &str>,
    from_seq: u64,
    to_seq: u64,
) -> Result<(), String> {
    let Some(seq) = seq else {
        return Err("hash_mismatch: checkpoint seq missing".into());
    };
    if seq < from_seq || seq > to_seq {
        return Ok(());
    }
    let recorded = checkpoint.get("hash").and_then(Value::as_str).unwrap_or("");
    match event_hashes.get(&seq) {
        Some(event_hash) if *event_hash == recorded => Ok(()),
        Some(event_hash) => Err(format!(
            "hash_mismatch: event {seq} has {event_hash}, checkpoint has {recorded}"
        )),
        None => Err(format!("hash_mismatch: event {seq} missing from pack")),
    }
}
