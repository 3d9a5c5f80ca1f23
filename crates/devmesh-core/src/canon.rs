//! Log canonicalization: versioned, deterministic text normalization.
//!
//! Converts raw log messages into canonical templates by replacing
//! high-entropy tokens (PIDs, IPs, timestamps, UUIDs, durations) with typed
//! placeholders. Pure functions, no I/O.
//!
//! The ruleset is versioned: changing a rule or its position requires a new
//! version constant and a new `apply_vN_rules`. Old versions stay callable so
//! existing templates remain valid and backfills can target a version.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::LogLevel;
use crate::Error;

/// Ruleset version applied by default on the live path.
pub const CANON_VERSION: &str = "v1";

// Specific key=value patterns first, broad token classes last. Order matters:
// a rule must not see text a more specific rule was meant to consume.

// 1. UFW firewall block fields
static UFW_MAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bMAC=([0-9a-fA-F]{2}:){5,}[0-9a-fA-F]{2}\b").unwrap());
static UFW_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bSRC=\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap());
static UFW_DST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bDST=\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap());
static UFW_SPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bSPT=\d+\b").unwrap());
static UFW_DPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bDPT=\d+\b").unwrap());
static UFW_LEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bLEN=\d+\b").unwrap());
static UFW_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bID=\d+\b").unwrap());
static UFW_TTL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bTTL=\d+\b").unwrap());

// 2. Structured key-value logs (Loki style)
static KV_TS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bts=\S+").unwrap());
static KV_CALLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcaller=(\w+\.go):\d+").unwrap());
static KV_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bduration=\S+").unwrap());

// 3. Batch progress messages
static BATCH_SENDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[BATCH\] Sending \d+").unwrap());

// 4. PAM / auth session lines
static PAM_USER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfor user \S+").unwrap());

// 5. Cron command lines
static CRON_CMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\w+)\) CMD \((.+?)\)").unwrap());

// 6. GIN-style API request lines, then remaining duration tokens
static GIN_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[GIN\]\s*\d{4}/\d{2}/\d{2}\s*-\s*\d{2}:\d{2}:\d{2}\s*\|\s*(\d+)\s*\|\s*[\d.]+[^|]*\|\s*\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
    )
    .unwrap()
});
static UNIT_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?(ms|s|m|h|us|ns)\b").unwrap());

// 7. Leading ISO-ish timestamp prefix
static PREFIX_TS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}[.\d]*Z?\s*").unwrap());

// 8. Bracketed PID wrapper
static BRACKET_PID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*\d+\]").unwrap());

// 9. Generic token classes (broadest, applied last)
static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}([.\d]*)([+-]\d{2}:?\d{2}|Z)?").unwrap()
});
static UUID_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .unwrap()
});
static LONG_HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{16,}\b").unwrap());
static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap());
static MAC_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}\b").unwrap());
static IPV6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}\b").unwrap());
static PID_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpid=\d+\b").unwrap());
static GENERIC_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?\s*(ms|s|m|h|us|ns|seconds|minutes|hours)\b").unwrap());
static LARGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4,}\b").unwrap());

// 10. Path hygiene
static HOME_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/home/[^/\s]+").unwrap());

// 11. Whitespace
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n\t\x00]").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"  +").unwrap());

fn apply_v1_rules(text: &str) -> String {
    // 1. UFW block fields
    let text = UFW_MAC.replace_all(text, "MAC=<MAC>");
    let text = UFW_SRC.replace_all(&text, "SRC=<IPV4>");
    let text = UFW_DST.replace_all(&text, "DST=<IPV4>");
    let text = UFW_SPT.replace_all(&text, "SPT=<PORT>");
    let text = UFW_DPT.replace_all(&text, "DPT=<PORT>");
    let text = UFW_LEN.replace_all(&text, "LEN=<N>");
    let text = UFW_ID.replace_all(&text, "ID=<N>");
    let text = UFW_TTL.replace_all(&text, "TTL=<N>");

    // 2. Structured key-value logs
    let text = KV_TS.replace_all(&text, "ts=<TS>");
    let text = KV_CALLER.replace_all(&text, "caller=${1}:<LINE>");
    let text = KV_DURATION.replace_all(&text, "duration=<DUR>");

    // 3. Batch progress
    let text = BATCH_SENDING.replace_all(&text, "[BATCH] Sending <N>");

    // 4. Session/auth lines
    let text = PAM_USER.replace_all(&text, "for user <USER>");

    // 5. Cron lines
    let text = CRON_CMD.replace_all(&text, "(<USER>) CMD (<CMD>)");

    // 6. API request lines; generic durations after so leftovers still match
    let text = GIN_LOG.replace_all(&text, "[GIN] <TS> | ${1} | <DUR> | <IPV4>");
    let text = UNIT_DURATION.replace_all(&text, "<DUR>");

    // 7. Leading timestamp prefix
    let text = PREFIX_TS.replace_all(&text, "<TS> ");

    // 8. Bracketed PID wrapper
    let text = BRACKET_PID.replace_all(&text, "[<PID>]");

    // 9. Generic token classes
    let text = ISO_TIMESTAMP.replace_all(&text, "<TS>");
    let text = UUID_TOKEN.replace_all(&text, "<UUID>");
    let text = LONG_HEX.replace_all(&text, "<HEX>");
    let text = IPV4.replace_all(&text, "<IPV4>");
    let text = MAC_ADDR.replace_all(&text, "<MAC>");
    let text = IPV6.replace_all(&text, "<IPV6>");
    let text = PID_FIELD.replace_all(&text, "pid=<PID>");
    let text = GENERIC_DURATION.replace_all(&text, "<DUR>");
    let text = LARGE_NUMBER.replace_all(&text, "<N>");

    // 10. User-scoped home directories, keeping the remainder of the path
    let text = HOME_DIR.replace_all(&text, "/home/<USER>");

    // 11. Whitespace collapse and trim
    let text = CONTROL_CHARS.replace_all(&text, " ");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Canonicalize a raw log message using the specified rule version.
pub fn canonicalize(text: &str, version: &str) -> Result<String> {
    match version {
        "v1" => Ok(apply_v1_rules(text)),
        other => Err(Error::CanonVersion(other.to_string())),
    }
}

fn truncated_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// 128-bit event dedup fingerprint over (timestamp, host, service, message).
pub fn log_hash(
    timestamp: &chrono::DateTime<chrono::Utc>,
    host: &str,
    service: &str,
    message: &str,
) -> String {
    let ts = timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    truncated_sha256(&format!("{ts}|{host}|{service}|{message}"))
}

/// 128-bit template identity fingerprint. Includes service, level and the
/// ruleset version so identical text from different services (or ruleset
/// generations) gets separate templates.
pub fn template_hash(service: &str, level: LogLevel, version: &str, canonical: &str) -> String {
    truncated_sha256(&format!("{service}|{level}|{version}|{canonical}"))
}

/// 128-bit fingerprint of the canonical text alone, kept for cross-service
/// template analytics.
pub fn canon_hash(canonical: &str) -> String {
    truncated_sha256(canonical)
}

/// Convenience wrapper: canonicalize and fingerprint in one call.
/// Returns (canonical_text, template_hash).
pub fn template_key(
    message: &str,
    service: &str,
    level: LogLevel,
    version: &str,
) -> Result<(String, String)> {
    let canonical = canonicalize(message, version)?;
    let hash = template_hash(service, level, version, &canonical);
    Ok((canonical, hash))
}

#[cfg(test)]
#[path = "canon_tests.rs"]
mod tests;
