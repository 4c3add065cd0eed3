//! DATEX II traffic situations adapter (SOAP pull).

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use roxmltree::Node;

use crate::availability::{AvailabilityTracker, Source};
use crate::domain::{Coordinate, IncidentSeverity, TrafficSituation};

use super::error::{ConversionError, UpstreamError};
use super::feed::{FeedCache, FeedCacheConfig, FeedResult};
use super::http::OtdClient;
use super::xml;

const SOAP_ACTION: &str =
    "http://opentransportdata.swiss/TDP/Soap_Datex2/Pull/v1/pullTrafficMessages";
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Adapter for road traffic situations.
pub struct SituationFeed {
    client: OtdClient,
    endpoint: String,
    tracker: Arc<AvailabilityTracker>,
    cache: FeedCache<(), Vec<TrafficSituation>>,
}

impl SituationFeed {
    pub fn new(
        client: OtdClient,
        endpoint: impl Into<String>,
        cache: &FeedCacheConfig,
        tracker: Arc<AvailabilityTracker>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            tracker,
            cache: FeedCache::new(Source::TrafficSituations, cache),
        }
    }

    /// Last polled situations. Never fetches.
    pub async fn latest(&self) -> FeedResult<Arc<Vec<TrafficSituation>>> {
        self.cache.latest(&()).await
    }

    pub async fn refresh(&self) -> FeedResult<Arc<Vec<TrafficSituation>>> {
        let outcome = self.fetch().await;
        self.cache.settle((), outcome, &self.tracker).await
    }

    async fn fetch(&self) -> Result<Vec<TrafficSituation>, UpstreamError> {
        let body = build_pull_request(Utc::now());
        let text = self
            .client
            .post_xml(&self.endpoint, body, Some(SOAP_ACTION))
            .await?;
        let situations = parse_situations(&text)?;
        tracing::debug!(count = situations.len(), "parsed traffic situations");
        Ok(situations)
    }
}

pub(crate) fn build_pull_request(now: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <PullTrafficMessages xmlns="http://opentransportdata.swiss/TDP/Soap_Datex2/Pull/v1">
      <clientIdentification xmlns="http://datex2.eu/schema/2/2_3">
        <country>ch</country>
        <nationalIdentifier>SwissTransportApp</nationalIdentifier>
      </clientIdentification>
      <operatingMode>operatingMode1</operatingMode>
      <requestDate>{}</requestDate>
      <returnStatus>active</returnStatus>
      <updateMethod>singleElementUpdate</updateMethod>
      <deliveryBreakdown>
        <deliveryLocation>http</deliveryLocation>
      </deliveryBreakdown>
    </PullTrafficMessages>
  </s:Body>
</s:Envelope>"#,
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub(crate) fn parse_situations(text: &str) -> Result<Vec<TrafficSituation>, UpstreamError> {
    let doc = xml::parse(text)?;
    let root = doc.root_element();

    if let Some(fault) = xml::descendant(root, "Fault") {
        let reason = xml::descendant_text(fault, "faultstring")
            .or_else(|| xml::descendant_text(fault, "Text"))
            .unwrap_or("SOAP fault");
        return Err(UpstreamError::malformed(reason));
    }

    Ok(xml::descendants(root, "situationRecord")
        .filter_map(|record| match parse_record(record) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "skipping traffic situation");
                None
            }
        })
        .collect())
}

fn parse_record(record: Node<'_, '_>) -> Result<TrafficSituation, ConversionError> {
    let id = record
        .attribute("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ConversionError::MissingField("id"))?;

    let description = xml::descendant(record, "generalPublicComment")
        .and_then(|comment| xml::localized_text(comment, "value", "en"))
        .unwrap_or_default();

    let position = Coordinate::from_parts(
        xml::descendant_text(record, "latitude").and_then(xml::parse_f64),
        xml::descendant_text(record, "longitude").and_then(xml::parse_f64),
    );

    // The overall severity usually sits on the enclosing situation.
    let severity = ["overallSeverity", "severity", "impactType"]
        .iter()
        .find_map(|name| xml::descendant_text(record, name))
        .or_else(|| {
            record
                .parent_element()
                .and_then(|situation| xml::child_text(situation, "overallSeverity"))
        })
        .map(IncidentSeverity::from_datex)
        .unwrap_or(IncidentSeverity::Minor);

    Ok(TrafficSituation {
        id: id.to_string(),
        description: description.chars().take(MAX_DESCRIPTION_CHARS).collect(),
        position,
        severity,
        start_time: xml::descendant_text(record, "overallStartTime").and_then(xml::parse_datetime),
        end_time: xml::descendant_text(record, "overallEndTime").and_then(xml::parse_datetime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PULL_RESPONSE: &str = r#"<soap:Envelope
      xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
      <soap:Body>
        <d2LogicalModel xmlns="http://datex2.eu/schema/2/2_0">
          <payloadPublication>
            <situation id="S1">
              <overallSeverity>high</overallSeverity>
              <situationRecord id="R1" version="1">
                <validity><validityTimeSpecification>
                  <overallStartTime>2024-03-15T05:30:00Z</overallStartTime>
                  <overallEndTime>2024-03-15T09:00:00Z</overallEndTime>
                </validityTimeSpecification></validity>
                <generalPublicComment><comment><values>
                  <value lang="de">Unfall</value>
                  <value lang="en">Accident on Bahnhofstrasse</value>
                </values></comment></generalPublicComment>
                <groupOfLocations><locationForDisplay>
                  <latitude>47.3769</latitude><longitude>8.5417</longitude>
                </locationForDisplay></groupOfLocations>
              </situationRecord>
            </situation>
            <situation id="S2">
              <situationRecord id="R2">
                <severity>medium</severity>
              </situationRecord>
              <situationRecord>
                <severity>low</severity>
              </situationRecord>
            </situation>
          </payloadPublication>
        </d2LogicalModel>
      </soap:Body>
    </soap:Envelope>"#;

    #[test]
    fn parses_records() {
        let situations = parse_situations(PULL_RESPONSE).unwrap();
        assert_eq!(situations.len(), 2);

        let accident = &situations[0];
        assert_eq!(accident.id, "R1");
        assert_eq!(accident.description, "Accident on Bahnhofstrasse");
        assert_eq!(accident.severity, IncidentSeverity::Severe);
        assert_eq!(accident.position, Some(Coordinate::new(47.3769, 8.5417)));
        assert_eq!(
            accident.start_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 5, 30, 0).unwrap())
        );

        let works = &situations[1];
        assert_eq!(works.severity, IncidentSeverity::Moderate);
        assert_eq!(works.position, None);
        assert_eq!(works.description, "");
        assert_eq!(works.end_time, None);
    }

    #[test]
    fn soap_fault_is_malformed() {
        let text = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
            <s:Fault>
              <faultcode>s:Client</faultcode>
              <faultstring>Invalid request</faultstring>
            </s:Fault>
        </s:Body></s:Envelope>"#;
        let err = parse_situations(text).unwrap_err();
        assert_eq!(err.to_string(), "malformed payload: Invalid request");
    }

    #[test]
    fn pull_request_is_well_formed() {
        let body = build_pull_request(Utc.with_ymd_and_hms(2024, 3, 15, 6, 0, 0).unwrap());
        assert!(body.contains("<requestDate>2024-03-15T06:00:00Z</requestDate>"));
        assert!(roxmltree::Document::parse(&body).is_ok());
    }
}
