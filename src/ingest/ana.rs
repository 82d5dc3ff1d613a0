/// ANA telemetry SOAP client.
///
/// Handles envelope construction, the HTTP exchange and XML response
/// parsing for the `DadosHidrometeorologicos` operation of:
///   https://telemetriaws1.ana.gov.br/ServiceANA.asmx
///
/// The service answers with a .NET DataSet diffgram wrapped in a SOAP 1.2
/// envelope. See `fixtures.rs` for annotated examples of the response.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::config::{ConversionPolicy, TelemetryConfig};
use crate::ingest::TelemetrySource;
use crate::model::{Reading, TelemetryError};

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Renders a date the way the service expects it: `DD/MM/YYYY`.
pub fn format_service_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Builds the SOAP 1.2 request envelope for one station and date range.
///
/// The operation element carries `codEstacao`, `dataInicio` and `dataFim`
/// in that order; the service rejects requests with the arguments reordered.
pub fn build_soap_envelope(
    operation: &str,
    namespace: &str,
    station_code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap12:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:soap12="http://www.w3.org/2003/05/soap-envelope">"#,
            "<soap12:Body>",
            r#"<{op} xmlns="{ns}">"#,
            "<codEstacao>{code}</codEstacao>",
            "<dataInicio>{start}</dataInicio>",
            "<dataFim>{end}</dataFim>",
            "</{op}>",
            "</soap12:Body>",
            "</soap12:Envelope>"
        ),
        op = operation,
        ns = escape_text(namespace),
        code = escape_text(station_code),
        start = format_service_date(start),
        end = format_service_date(end),
    )
}

fn escape_text(raw: &str) -> String {
    quick_xml::escape::escape(raw).into_owned()
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking client for the ANA telemetry service.
///
/// One call to `fetch` is exactly one HTTP POST; retrying is left to
/// `ingest::retry`.
pub struct AnaClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    operation: String,
    namespace: String,
}

impl AnaClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TelemetryError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            operation: config.operation.clone(),
            namespace: config.namespace.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TelemetrySource for AnaClient {
    fn fetch(
        &self,
        station_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, TelemetryError> {
        let envelope =
            build_soap_envelope(&self.operation, &self.namespace, station_code, start, end);

        debug!(
            station = station_code,
            %start,
            %end,
            endpoint = %self.endpoint,
            "requesting telemetry"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TelemetryError::Transport(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(TelemetryError::Service {
                status: status.as_u16(),
                body,
            });
        }

        debug!(station = station_code, bytes = body.len(), "telemetry received");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

const CONTAINER: &[u8] = b"DocumentElement";
const RECORD: &[u8] = b"DadosHidrometereologicos";
const FAULT: &[u8] = b"Fault";

const FIELD_STATION: &str = "CodEstacao";
const FIELD_TIMESTAMP: &str = "DataHora";
const FIELD_LEVEL: &str = "Nivel";
const FIELD_RAINFALL: &str = "Chuva";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Raw text of one record's fields, before conversion.
#[derive(Debug, Default)]
struct RawRecord {
    station: Option<String>,
    timestamp: Option<String>,
    level: Option<String>,
    rainfall: Option<String>,
}

impl RawRecord {
    fn slot(&mut self, name: &[u8]) -> Option<&mut Option<String>> {
        match name {
            b"CodEstacao" => Some(&mut self.station),
            b"DataHora" => Some(&mut self.timestamp),
            b"Nivel" => Some(&mut self.level),
            b"Chuva" => Some(&mut self.rainfall),
            _ => None,
        }
    }
}

/// Where the streaming reader currently is, relative to the elements we
/// care about. Depths count open elements, the root being depth 1.
#[derive(Debug, Default)]
struct ScanState {
    depth: usize,
    saw_root: bool,
    /// Byte offset just past the root element's end tag.
    root_end: Option<usize>,
    container_depth: Option<usize>,
    record_depth: Option<usize>,
    field: Option<Vec<u8>>,
    fault_depth: Option<usize>,
    fault_reason_depth: Option<usize>,
    fault_reason: String,
    current: RawRecord,
    records: Vec<RawRecord>,
}

impl ScanState {
    fn open(&mut self, name: &[u8]) {
        self.depth += 1;
        self.saw_root = true;

        if name == FAULT && self.fault_depth.is_none() {
            self.fault_depth = Some(self.depth);
        } else if self.fault_depth.is_some()
            && self.fault_reason_depth.is_none()
            && (name == b"Text" || name == b"faultstring")
        {
            self.fault_reason_depth = Some(self.depth);
        }

        match (self.container_depth, self.record_depth) {
            (None, _) if name == CONTAINER => self.container_depth = Some(self.depth),
            (Some(container), None) if name == RECORD && self.depth == container + 1 => {
                self.record_depth = Some(self.depth);
                self.current = RawRecord::default();
            }
            (_, Some(record)) if self.depth == record + 1 => {
                if let Some(slot) = self.current.slot(name) {
                    *slot = Some(String::new());
                    self.field = Some(name.to_vec());
                }
            }
            _ => {}
        }
    }

    fn close(&mut self) {
        if self.record_depth.is_some_and(|d| d + 1 == self.depth) {
            self.field = None;
        }
        if self.record_depth == Some(self.depth) {
            self.records.push(std::mem::take(&mut self.current));
            self.record_depth = None;
        }
        if self.container_depth == Some(self.depth) {
            self.container_depth = None;
        }
        if self.fault_reason_depth == Some(self.depth) {
            self.fault_reason_depth = None;
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn mark_root_end(&mut self, position: usize) {
        if self.depth == 0 && self.root_end.is_none() {
            self.root_end = Some(position);
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(name) = self.field.as_deref() {
            if let Some(Some(value)) = self.current.slot(name) {
                value.push_str(text);
            }
        }
        if self.fault_reason_depth.is_some() {
            if !self.fault_reason.is_empty() {
                self.fault_reason.push(' ');
            }
            self.fault_reason.push_str(text.trim());
        }
    }
}

/// Parses a `DadosHidrometeorologicos` SOAP response into readings, in
/// document order.
///
/// Namespace prefixes are ignored and field values are trimmed. Records
/// that fail conversion are handled according to `policy`: `Abort` returns
/// the first failure, `Drop` skips them and logs one summary warning.
///
/// # Errors
/// - `TelemetryError::Parse` - empty input or markup that is not well-formed.
/// - `TelemetryError::Fault` - the service answered with a SOAP fault.
/// - `TelemetryError::MalformedResponse` / `FieldConversion` - a bad record,
///   only under `ConversionPolicy::Abort`.
pub fn parse_response(
    xml: &str,
    policy: ConversionPolicy,
) -> Result<Vec<Reading>, TelemetryError> {
    let records = scan_records(xml)?;

    let mut readings = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    let mut first_drop: Option<TelemetryError> = None;

    for (index, raw) in records.into_iter().enumerate() {
        match convert_record(index, raw) {
            Ok(reading) => readings.push(reading),
            Err(e) => match policy {
                ConversionPolicy::Abort => return Err(e),
                ConversionPolicy::Drop => {
                    dropped += 1;
                    first_drop.get_or_insert(e);
                }
            },
        }
    }

    if let Some(first) = first_drop {
        warn!(
            dropped,
            kept = readings.len(),
            first_error = %first,
            "dropped telemetry records that failed conversion"
        );
    }

    Ok(readings)
}

fn scan_records(xml: &str) -> Result<Vec<RawRecord>, TelemetryError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut state = ScanState::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            TelemetryError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        if matches!(event, Event::Start(_) | Event::Empty(_)) && state.root_end.is_some() {
            return Err(TelemetryError::Parse(format!(
                "multiple root elements, second at byte {}",
                reader.buffer_position()
            )));
        }

        match event {
            Event::Start(e) => state.open(e.local_name().as_ref()),
            Event::Empty(e) => {
                state.open(e.local_name().as_ref());
                state.close();
                state.mark_root_end(reader.buffer_position());
            }
            Event::End(_) => {
                state.close();
                state.mark_root_end(reader.buffer_position());
            }
            Event::Text(t) => {
                if state.depth == 0 {
                    return Err(TelemetryError::Parse(format!(
                        "text outside the root element at byte {}",
                        reader.buffer_position()
                    )));
                }
                let text = t
                    .unescape()
                    .map_err(|e| TelemetryError::Parse(format!("bad character data: {}", e)))?;
                state.text(&text);
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                state.text(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !state.saw_root {
        return Err(TelemetryError::Parse("document has no root element".to_string()));
    }
    if state.depth != 0 {
        return Err(TelemetryError::Parse(format!(
            "document ended with {} unclosed element(s)",
            state.depth
        )));
    }
    if let Some(rest) = state
        .root_end
        .and_then(|end| trailing_markup(xml.get(end..).unwrap_or("")))
    {
        let preview: String = rest.chars().take(20).collect();
        return Err(TelemetryError::Parse(format!(
            "unexpected content after the root element: '{}'",
            preview
        )));
    }
    if state.fault_depth.is_some() {
        let reason = if state.fault_reason.is_empty() {
            "unspecified fault".to_string()
        } else {
            state.fault_reason
        };
        return Err(TelemetryError::Fault(reason));
    }

    Ok(state.records)
}

/// Whatever follows the root element other than whitespace, comments and
/// processing instructions.
fn trailing_markup(tail: &str) -> Option<&str> {
    let mut rest = tail.trim_start();
    while !rest.is_empty() {
        let terminator = if rest.starts_with("<!--") {
            "-->"
        } else if rest.starts_with("<?") {
            "?>"
        } else {
            return Some(rest);
        };
        match rest.find(terminator) {
            Some(end) => rest = rest[end + terminator.len()..].trim_start(),
            None => return Some(rest),
        }
    }
    None
}

fn convert_record(index: usize, raw: RawRecord) -> Result<Reading, TelemetryError> {
    let station = required(index, FIELD_STATION, raw.station)?;
    let timestamp_text = required(index, FIELD_TIMESTAMP, raw.timestamp)?;
    let level_text = required(index, FIELD_LEVEL, raw.level)?;
    let rainfall_text = required(index, FIELD_RAINFALL, raw.rainfall)?;

    let timestamp = parse_timestamp(&timestamp_text).ok_or_else(|| {
        TelemetryError::FieldConversion {
            record: index,
            field: FIELD_TIMESTAMP,
            value: timestamp_text.clone(),
        }
    })?;

    Ok(Reading {
        station_id: station,
        timestamp,
        level: parse_measurement(index, FIELD_LEVEL, &level_text)?,
        rainfall: parse_measurement(index, FIELD_RAINFALL, &rainfall_text)?,
    })
}

fn required(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, TelemetryError> {
    value.map(|v| v.trim().to_string()).ok_or_else(|| {
        TelemetryError::MalformedResponse(format!("record {} has no {} element", index, field))
    })
}

/// Parses a service timestamp. Any of the formats the service has been seen
/// to emit is accepted; the value is taken as local station time.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Level and rainfall must be finite and non-negative.
fn parse_measurement(index: usize, field: &'static str, text: &str) -> Result<f64, TelemetryError> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(TelemetryError::FieldConversion {
            record: index,
            field,
            value: text.to_string(),
        }),
    }
}
