//! VAT identifier validation: a local format gate plus an optional lookup
//! against the Czech Ministry of Finance unreliable-VAT-payer registry.
//!
//! The registry is strictly best-effort: an unreachable or confused service
//! degrades the result to [`VatStatus::Unavailable`] and the pipeline keeps
//! going — an invoice must never be lost because a tax office endpoint had a
//! bad day. The only hard failure here is a malformed identifier, which is
//! rejected before any network traffic.
//!
//! The service speaks SOAP with a fixed two-attribute response grammar
//! (`statusPlatceDPH dic=".." nespolehlivyPlatce=".."`), which is scanned
//! with anchored regexes; any scan miss maps to `Unavailable`.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// The Czech Ministry of Finance unreliable-VAT-payer SOAP endpoint.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://adisrws.mfcr.cz/adistc/axis2/services/rozhraniCRPDPH.rozhraniCRPDPHSOAP";

const SOAP_ACTION: &str = "http://adis.mfcr.cz/rozhraniCRPDPH/getStatusNespolehlivyPlatce";

/// Registry verdict for a VAT identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VatStatus {
    /// The payer exists in the registry and is not flagged unreliable.
    Valid,
    /// The payer is flagged unreliable, or the identifier is not registered.
    Invalid,
    /// The registry could not answer (unreachable, error status, or a
    /// non-Czech identifier it does not cover).
    Unavailable,
}

impl fmt::Display for VatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VatStatus::Valid => "valid",
            VatStatus::Invalid => "invalid",
            VatStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

static RE_VAT_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}[0-9]{8,10}$").unwrap());
static RE_STATUS_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"statusCode="([^"]*)""#).unwrap());
static RE_PAYER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:[A-Za-z0-9_]+:)?statusPlatceDPH\b([^>]*)>").unwrap());
static RE_DIC: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bdic="([^"]*)""#).unwrap());
static RE_UNRELIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bnespolehlivyPlatce="([^"]*)""#).unwrap());

/// Normalise an extracted identifier: strip spaces, uppercase.
pub fn normalise(vat_id: &str) -> String {
    vat_id
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Enforce the expected identifier shape (two letters + 8–10 digits) before
/// anything touches the network. Returns the normalised identifier.
pub fn validate_format(vat_id: &str) -> Result<String, ExtractError> {
    let normalised = normalise(vat_id);
    if RE_VAT_FORMAT.is_match(&normalised) {
        Ok(normalised)
    } else {
        Err(ExtractError::MalformedVatId {
            vat_id: vat_id.to_string(),
        })
    }
}

/// Client for the unreliable-VAT-payer registry.
pub struct VatValidator {
    client: reqwest::Client,
    url: String,
}

impl VatValidator {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.registry_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            url: config
                .registry_url
                .clone()
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
        })
    }

    /// Check one identifier against the registry.
    ///
    /// Fails fast with [`ExtractError::MalformedVatId`] on a bad format; the
    /// registry only covers Czech identifiers, so any other country prefix
    /// returns [`VatStatus::Unavailable`] without a network call.
    pub async fn check(&self, vat_id: &str) -> Result<VatStatus, ExtractError> {
        let normalised = validate_format(vat_id)?;

        let Some(dic) = normalised.strip_prefix("CZ") else {
            debug!("VAT id {normalised} is not Czech, registry cannot answer");
            return Ok(VatStatus::Unavailable);
        };

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(registry_request_body(dic))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("VAT registry unreachable: {e}");
                return Ok(VatStatus::Unavailable);
            }
        };

        if !response.status().is_success() {
            warn!("VAT registry returned HTTP {}", response.status());
            return Ok(VatStatus::Unavailable);
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!("VAT registry response unreadable: {e}");
                return Ok(VatStatus::Unavailable);
            }
        };

        let status = parse_registry_response(&body, dic);
        debug!("VAT registry verdict for CZ{dic}: {status}");
        Ok(status)
    }
}

/// The SOAP request envelope for one DIČ (the numeric part of a CZ VAT id).
fn registry_request_body(dic: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
    <soapenv:Body>
        <StatusNespolehlivyPlatceRequest xmlns="http://adis.mfcr.cz/rozhraniCRPDPH/">
            <dic>{dic}</dic>
        </StatusNespolehlivyPlatceRequest>
    </soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// Map a registry response body to a verdict.
///
/// Attribute semantics: `nespolehlivyPlatce` is "unreliable payer" —
/// `NENALEZEN` means the identifier is not registered, `ANO` flags an
/// unreliable payer, `NE` (or an empty/unknown value) means the payer is in
/// good standing. A success status with no record for the queried DIČ means
/// the identifier does not exist.
fn parse_registry_response(xml: &str, dic: &str) -> VatStatus {
    let status_code = RE_STATUS_CODE.captures(xml).map(|c| c[1].to_string());
    match status_code.as_deref() {
        Some("0") => {}
        Some(code) => {
            warn!("VAT registry returned status code {code}");
            return VatStatus::Unavailable;
        }
        None => {
            warn!("VAT registry response has no status element");
            return VatStatus::Unavailable;
        }
    }

    let mut saw_any_record = false;
    for payer in RE_PAYER.captures_iter(xml) {
        saw_any_record = true;
        let attrs = &payer[1];
        let record_dic = RE_DIC.captures(attrs).map(|c| c[1].to_string());
        if record_dic.as_deref() != Some(dic) {
            continue;
        }

        let unreliable = RE_UNRELIABLE
            .captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        return match unreliable.as_str() {
            "NENALEZEN" | "ANO" => VatStatus::Invalid,
            _ => VatStatus::Valid,
        };
    }

    if saw_any_record {
        warn!("VAT registry answered but has no record for CZ{dic}");
    }
    VatStatus::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(payers: &str) -> String {
        format!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
<soapenv:Body><StatusNespolehlivyPlatceResponse xmlns="http://adis.mfcr.cz/rozhraniCRPDPH/">
<status bezVypisuDic="false" statusText="OK" statusCode="0"/>
{payers}
</StatusNespolehlivyPlatceResponse></soapenv:Body></soapenv:Envelope>"#
        )
    }

    #[test]
    fn normalise_strips_spaces_and_uppercases() {
        assert_eq!(normalise(" cz 123 456 78 "), "CZ12345678");
    }

    #[test]
    fn format_gate_accepts_company_and_person_lengths() {
        assert_eq!(validate_format("CZ12345678").unwrap(), "CZ12345678");
        assert_eq!(validate_format("cz1234567890").unwrap(), "CZ1234567890");
        assert_eq!(validate_format("DE123456789").unwrap(), "DE123456789");
    }

    #[test]
    fn format_gate_rejects_malformed_ids() {
        for bad in ["12345678", "CZ1234", "CZABCD5678", "C212345678", "CZ123456789012"] {
            let err = validate_format(bad).unwrap_err();
            assert!(
                matches!(err, ExtractError::MalformedVatId { .. }),
                "{bad} should be malformed"
            );
        }
    }

    #[tokio::test]
    async fn malformed_id_fails_before_any_network() {
        // The validator points at an unroutable endpoint; a malformed id must
        // error out instantly rather than degrade to Unavailable.
        let config = ExtractionConfig::builder()
            .registry_url("http://192.0.2.1/registry")
            .registry_timeout_secs(1)
            .build()
            .unwrap();
        let validator = VatValidator::new(&config).unwrap();

        let err = validator.check("not-a-vat-id").await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedVatId { .. }));
    }

    #[tokio::test]
    async fn non_czech_id_is_unavailable_without_lookup() {
        let config = ExtractionConfig::builder()
            .registry_url("http://192.0.2.1/registry")
            .registry_timeout_secs(1)
            .build()
            .unwrap();
        let validator = VatValidator::new(&config).unwrap();

        let status = validator.check("DE123456789").await.unwrap();
        assert_eq!(status, VatStatus::Unavailable);
    }

    #[test]
    fn reliable_payer_is_valid() {
        let xml = response(r#"<statusPlatceDPH nespolehlivyPlatce="NE" dic="12345678"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Valid);
    }

    #[test]
    fn unreliable_payer_is_invalid() {
        let xml = response(r#"<statusPlatceDPH nespolehlivyPlatce="ANO" dic="12345678"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Invalid);
    }

    #[test]
    fn unregistered_payer_is_invalid() {
        let xml = response(r#"<statusPlatceDPH nespolehlivyPlatce="NENALEZEN" dic="12345678"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Invalid);
    }

    #[test]
    fn missing_record_for_queried_dic_is_invalid() {
        let xml = response(r#"<statusPlatceDPH nespolehlivyPlatce="NE" dic="99999999"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Invalid);
    }

    #[test]
    fn empty_reliability_attribute_is_valid() {
        let xml = response(r#"<statusPlatceDPH nespolehlivyPlatce="" dic="12345678"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Valid);
    }

    #[test]
    fn namespaced_elements_are_matched() {
        let xml = response(r#"<ns2:statusPlatceDPH nespolehlivyPlatce="NE" dic="12345678"/>"#);
        assert_eq!(parse_registry_response(&xml, "12345678"), VatStatus::Valid);
    }

    #[test]
    fn error_status_code_is_unavailable() {
        let xml = r#"<env><status statusCode="3" statusText="CHYBA"/></env>"#;
        assert_eq!(parse_registry_response(xml, "12345678"), VatStatus::Unavailable);
    }

    #[test]
    fn garbage_response_is_unavailable() {
        assert_eq!(
            parse_registry_response("502 Bad Gateway", "12345678"),
            VatStatus::Unavailable
        );
    }

    #[test]
    fn request_body_embeds_dic() {
        let body = registry_request_body("12345678");
        assert!(body.contains("<dic>12345678</dic>"));
        assert!(body.contains("StatusNespolehlivyPlatceRequest"));
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&VatStatus::Unavailable).unwrap(),
            r#""unavailable""#
        );
        assert_eq!(VatStatus::Valid.to_string(), "valid");
    }
}
