//! Verb encoders and the line parser.
//!
//! Every verb is newline-terminated; string fields are quoted with
//! backslash escaping. v1 metadata/value verbs (`CHART`, `DIMENSION`,
//! `LABEL`, `BEGIN`/`SET`/`END`, ...) use double quotes; v2 value verbs
//! (`BEGIN_V2`/`SET_V2`/`END_V2`) use single quotes, matching the literal
//! example in §8 S1 — the one-byte `#` same-value marker and the quote
//! style are both things "an implementer must preserve exactly".

use telem_types::{ChartDef, DimensionDef};

use crate::numeric::{encode_float, encode_int};

fn quote(field: &str, quote_char: char) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push(quote_char);
    for ch in field.chars() {
        if ch == quote_char || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push(quote_char);
    out
}

fn dquote(field: &str) -> String {
    quote(field, '"')
}

fn squote(field: &str) -> String {
    quote(field, '\'')
}

/// `CHART id name title units family context type prio update_every flags plugin module`.
#[must_use]
pub fn encode_chart(chart: &ChartDef) -> String {
    format!(
        "CHART {} {} {} {} {} {} {} {} {} {} {} {}",
        dquote(chart.id.as_str()),
        dquote(chart.name.as_deref().unwrap_or("")),
        dquote(&chart.title),
        dquote(&chart.units),
        dquote(&chart.family),
        dquote(&chart.context),
        dquote(&chart.chart_type),
        chart.priority,
        chart.update_every,
        dquote(&chart.flag_string()),
        dquote(chart.plugin.as_deref().unwrap_or("")),
        dquote(chart.module.as_deref().unwrap_or("")),
    )
}

/// `DIMENSION id name algorithm mult div flags`.
#[must_use]
pub fn encode_dimension(dim: &DimensionDef) -> String {
    format!(
        "DIMENSION {} {} {} {} {} {}",
        dquote(dim.id.as_str()),
        dquote(&dim.name),
        dim.algorithm.as_wire_token(),
        dim.multiplier,
        dim.divisor,
        dquote(&dim.flag_string()),
    )
}

/// `CLABEL name value source`.
#[must_use]
pub fn encode_clabel(name: &str, value: &str, source: &str) -> String {
    format!("CLABEL {} {} {}", dquote(name), dquote(value), dquote(source))
}

/// `CLABEL_COMMIT`, terminating a run of `CLABEL` records.
#[must_use]
pub fn encode_clabel_commit() -> &'static str {
    "CLABEL_COMMIT"
}

/// `LABEL name value source` (host labels; `OVERWRITE` uses the same shape).
#[must_use]
pub fn encode_label(name: &str, value: &str, source: &str) -> String {
    format!("LABEL {} {} {}", dquote(name), dquote(value), dquote(source))
}

/// `OVERWRITE`, terminating a run of `LABEL` records and replacing the
/// host's label set atomically on the receiver.
#[must_use]
pub fn encode_overwrite() -> &'static str {
    "OVERWRITE"
}

/// `SET "<dim_id>" = <int>` (v1 value record).
#[must_use]
pub fn encode_set_v1(dim_id: &str, value: i64) -> String {
    format!("SET {} = {value}", dquote(dim_id))
}

/// `END` (v1, terminates a `BEGIN`/`SET*` group).
#[must_use]
pub fn encode_end_v1() -> &'static str {
    "END"
}

/// `CHART_DEFINITION_END <db_first> <db_last> <now>`: flips the chart into
/// `sender_replication_in_progress` on the sender side.
#[must_use]
pub fn encode_chart_definition_end(db_first: i64, db_last: i64, now: i64) -> String {
    format!("CHART_DEFINITION_END {db_first} {db_last} {now}")
}

/// `CLAIMED_ID machine_guid claim_id`.
#[must_use]
pub fn encode_claimed_id(machine_guid: &str, claim_id: &str) -> String {
    format!("CLAIMED_ID {} {}", dquote(machine_guid), dquote(claim_id))
}

/// A `BEGIN_V2`/`SET_V2` numeric field that may be replaced with the `#`
/// same-as-previous marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrSame<T> {
    /// An explicit value for this field.
    Value(T),
    /// `#`: reuse the value from the previous record (wall-clock equal to
    /// `point_end_time`, or the dimension's `last_collected_value`).
    Same,
}

/// `BEGIN_V2 [SLOT:<n>] '<chart_id>' <update_every> <point_end_time> <wall_clock|#>`.
#[must_use]
pub fn encode_begin_v2(
    slot: Option<u32>,
    chart_id: &str,
    update_every: u32,
    point_end_time: i64,
    wall_clock: OrSame<i64>,
    ieee754: bool,
) -> String {
    let slot_prefix = slot.map(|n| format!("SLOT:{n} ")).unwrap_or_default();
    let wall_clock = match wall_clock {
        OrSame::Value(v) => encode_int(v, ieee754),
        OrSame::Same => "#".to_string(),
    };
    let chart_id = squote(chart_id);
    let update_every = encode_int(i64::from(update_every), ieee754);
    let point_end_time = encode_int(point_end_time, ieee754);
    format!("BEGIN_V2 {slot_prefix}{chart_id} {update_every} {point_end_time} {wall_clock}")
}

/// `SET_V2 [SLOT:<n>] '<dim_id>' <last_collected_int> <value|#> <flag_string>`.
#[must_use]
pub fn encode_set_v2(
    slot: Option<u32>,
    dim_id: &str,
    last_collected: i64,
    value: OrSame<f64>,
    flags: &str,
    ieee754: bool,
) -> String {
    let slot_prefix = slot.map(|n| format!("SLOT:{n} ")).unwrap_or_default();
    let value = match value {
        OrSame::Value(v) => encode_float(v, ieee754),
        OrSame::Same => "#".to_string(),
    };
    format!(
        "SET_V2 {slot_prefix}{} {} {value} {}",
        squote(dim_id),
        encode_int(last_collected, ieee754),
        squote(flags),
    )
}

/// `END_V2` (terminates a `BEGIN_V2`/`SET_V2*` group).
#[must_use]
pub fn encode_end_v2() -> &'static str {
    "END_V2"
}

/// One parsed token run: fully split on whitespace with quote-aware
/// grouping, verb name uppercased as the discriminant.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' || c == '\'' {
            let quote_char = c;
            chars.next();
            let mut field = String::new();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        field.push(escaped);
                    }
                } else if c == quote_char {
                    break;
                } else {
                    field.push(c);
                }
            }
            tokens.push(field);
        } else {
            let mut field = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                field.push(c);
                chars.next();
            }
            tokens.push(field);
        }
    }
    tokens
}

/// A successfully parsed wire line, discriminated by verb.
/// Unknown verbs are represented as [`ParsedVerb::Unknown`] rather than an
/// error — §4.4 says unknown verbs are logged and skipped, not fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedVerb {
    /// `CHART` definition.
    Chart {
        /// Raw positional fields, in wire order, already unquoted.
        fields: Vec<String>,
    },
    /// `DIMENSION` definition.
    Dimension {
        /// Raw positional fields, in wire order, already unquoted.
        fields: Vec<String>,
    },
    /// `CLABEL name value source`.
    ClLabel {
        /// Label name.
        name: String,
        /// Label value.
        value: String,
        /// Label provenance.
        source: String,
    },
    /// `CLABEL_COMMIT`.
    ClLabelCommit,
    /// `LABEL name value source`.
    Label {
        /// Label name.
        name: String,
        /// Label value.
        value: String,
        /// Label provenance.
        source: String,
    },
    /// `OVERWRITE`.
    Overwrite,
    /// `BEGIN "<chart_id>" <usec>`.
    Begin {
        /// Chart this begins a commit for.
        chart_id: String,
        /// Raw (unparsed) microsecond/zero-suppressed field.
        usec_field: String,
    },
    /// `SET "<dim_id>" = <value>`.
    Set {
        /// Dimension this value belongs to.
        dim_id: String,
        /// Raw (unparsed) integer field.
        value_field: String,
    },
    /// `END`.
    End,
    /// `BEGIN_V2 [SLOT:<n>] '<chart_id>' <update_every> <point_end_time> <wall_clock|#>`.
    BeginV2 {
        /// Slot index, if `SLOTS` was negotiated.
        slot: Option<u32>,
        /// Chart this begins a v2 commit for.
        chart_id: String,
        /// Raw update-every field.
        update_every_field: String,
        /// Raw point-end-time field.
        point_end_time_field: String,
        /// Raw wall-clock field, possibly `#`.
        wall_clock_field: String,
    },
    /// `SET_V2 [SLOT:<n>] '<dim_id>' <last_collected> <value|#> <flags>`.
    SetV2 {
        /// Slot index, if `SLOTS` was negotiated.
        slot: Option<u32>,
        /// Dimension this value belongs to.
        dim_id: String,
        /// Raw last-collected field.
        last_collected_field: String,
        /// Raw value field, possibly `#`.
        value_field: String,
        /// Per-point flag string (e.g. anomaly marker).
        flags: String,
    },
    /// `END_V2`.
    EndV2,
    /// `CHART_DEFINITION_END db_first db_last now`.
    ChartDefinitionEnd {
        /// First stored point for this chart, as presented by the child.
        db_first: i64,
        /// Last stored point for this chart, as presented by the child.
        db_last: i64,
        /// Wall-clock time the child observed at emission.
        now: i64,
    },
    /// `CLAIMED_ID machine_guid claim_id`.
    ClaimedId {
        /// Machine GUID the claim applies to.
        machine_guid: String,
        /// Cloud claim id.
        claim_id: String,
    },
    /// `REPORT_JOB_STATUS`, `DELETE_JOB`, or any `DYNCFG_*` token; the
    /// dynamic-configuration subsystem that interprets these is out of
    /// scope here, so the payload is kept opaque.
    Dyncfg {
        /// The verb token itself (e.g. `"DYNCFG_ENABLE"`).
        verb: String,
        /// Remaining raw fields, already unquoted.
        fields: Vec<String>,
    },
    /// `REPLAY_*`: replication control, subsystem-specific.
    Replay {
        /// The verb token itself (e.g. `"REPLAY_CHART"`).
        verb: String,
        /// Remaining raw fields, already unquoted.
        fields: Vec<String>,
    },
    /// Any verb not recognized above; logged and skipped, never
    /// fatal to the session on its own.
    Unknown {
        /// The unrecognized verb token.
        verb: String,
        /// Remaining raw fields, already unquoted.
        fields: Vec<String>,
    },
}

/// Parse one wire line into a [`ParsedVerb`]. Returns `None` for a blank
/// line (e.g. a trailing newline at EOF); a line with a verb token but
/// missing required fields for that *specific* verb is a parse error
///,
/// surfaced as `Err`.
///
/// # Errors
/// Returns an error string when a recognized verb is missing a required
/// field.
pub fn parse_line(line: &str) -> Result<Option<ParsedVerb>, String> {
    let tokens = tokenize(line);
    let Some((verb, rest)) = tokens.split_first() else {
        return Ok(None);
    };
    let rest = rest.to_vec();
    let verb_upper = verb.to_ascii_uppercase();

    let parsed = match verb_upper.as_str() {
        "CHART" => ParsedVerb::Chart { fields: rest },
        "DIMENSION" => ParsedVerb::Dimension { fields: rest },
        "CLABEL" => {
            let [name, value, source] = take3(&rest, "CLABEL")?;
            ParsedVerb::ClLabel { name, value, source }
        }
        "CLABEL_COMMIT" => ParsedVerb::ClLabelCommit,
        "LABEL" => {
            let [name, value, source] = take3(&rest, "LABEL")?;
            ParsedVerb::Label { name, value, source }
        }
        "OVERWRITE" => ParsedVerb::Overwrite,
        "BEGIN" => {
            let chart_id = rest.first().cloned().ok_or("BEGIN missing chart id")?;
            let usec_field = rest.get(1).cloned().unwrap_or_else(|| "0".to_string());
            ParsedVerb::Begin { chart_id, usec_field }
        }
        "SET" => {
            let dim_id = rest.first().cloned().ok_or("SET missing dimension id")?;
            // rest[1] is the literal "=" token.
            let value_field = rest.get(2).cloned().ok_or("SET missing value")?;
            ParsedVerb::Set { dim_id, value_field }
        }
        "END" => ParsedVerb::End,
        "BEGIN_V2" => parse_begin_v2(&rest)?,
        "SET_V2" => parse_set_v2(&rest)?,
        "END_V2" => ParsedVerb::EndV2,
        "CHART_DEFINITION_END" => {
            let [first, last, now] = take3(&rest, "CHART_DEFINITION_END")?;
            ParsedVerb::ChartDefinitionEnd {
                db_first: first.parse().map_err(|_| "bad db_first")?,
                db_last: last.parse().map_err(|_| "bad db_last")?,
                now: now.parse().map_err(|_| "bad now")?,
            }
        }
        "CLAIMED_ID" => {
            let machine_guid = rest.first().cloned().ok_or("CLAIMED_ID missing machine_guid")?;
            let claim_id = rest.get(1).cloned().ok_or("CLAIMED_ID missing claim_id")?;
            ParsedVerb::ClaimedId { machine_guid, claim_id }
        }
        v if v.starts_with("DYNCFG") || v == "REPORT_JOB_STATUS" || v == "DELETE_JOB" => {
            ParsedVerb::Dyncfg { verb: verb.clone(), fields: rest }
        }
        v if v.starts_with("REPLAY") => ParsedVerb::Replay { verb: verb.clone(), fields: rest },
        _ => ParsedVerb::Unknown { verb: verb.clone(), fields: rest },
    };
    Ok(Some(parsed))
}

fn take3(fields: &[String], verb: &str) -> Result<[String; 3], String> {
    if fields.len() < 3 {
        return Err(format!("{verb} requires 3 fields, got {}", fields.len()));
    }
    Ok([fields[0].clone(), fields[1].clone(), fields[2].clone()])
}

fn split_slot(fields: &[String]) -> Result<(Option<u32>, &[String]), String> {
    if let Some(first) = fields.first()
        && let Some(n) = first.strip_prefix("SLOT:")
    {
        let slot = n.parse::<u32>().map_err(|_| format!("bad SLOT index {n:?}"))?;
        return Ok((Some(slot), &fields[1..]));
    }
    Ok((None, fields))
}

fn parse_begin_v2(rest: &[String]) -> Result<ParsedVerb, String> {
    let (slot, rest) = split_slot(rest)?;
    if rest.len() < 4 {
        return Err(format!("BEGIN_V2 requires 4 fields, got {}", rest.len()));
    }
    Ok(ParsedVerb::BeginV2 {
        slot,
        chart_id: rest[0].clone(),
        update_every_field: rest[1].clone(),
        point_end_time_field: rest[2].clone(),
        wall_clock_field: rest[3].clone(),
    })
}

fn parse_set_v2(rest: &[String]) -> Result<ParsedVerb, String> {
    let (slot, rest) = split_slot(rest)?;
    if rest.len() < 4 {
        return Err(format!("SET_V2 requires 4 fields, got {}", rest.len()));
    }
    Ok(ParsedVerb::SetV2 {
        slot,
        dim_id: rest[0].clone(),
        last_collected_field: rest[1].clone(),
        value_field: rest[2].clone(),
        flags: rest[3].clone(),
    })
}
