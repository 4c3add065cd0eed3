//! SIRI-SX situation exchange adapter (service disruptions).

use std::sync::Arc;

use roxmltree::Node;

use crate::availability::{AvailabilityTracker, Source};
use crate::domain::{Disruption, Severity};

use super::error::{ConversionError, UpstreamError};
use super::feed::{FeedCache, FeedCacheConfig, FeedResult};
use super::http::OtdClient;
use super::xml;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 1000;
/// Cap on affected lines and stops kept per disruption.
const MAX_AFFECTED: usize = 20;
const PREFERRED_LANG: &str = "en";

/// Adapter for the disruption feed.
pub struct DisruptionFeed {
    client: OtdClient,
    endpoint: String,
    tracker: Arc<AvailabilityTracker>,
    cache: FeedCache<(), Vec<Disruption>>,
}

impl DisruptionFeed {
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
            cache: FeedCache::new(Source::Disruptions, cache),
        }
    }

    /// Fetch the full situation list. Always hits the upstream.
    pub async fn fetch(&self) -> FeedResult<Arc<Vec<Disruption>>> {
        let outcome = self.fetch_inner().await;
        self.cache.settle((), outcome, &self.tracker).await
    }

    async fn fetch_inner(&self) -> Result<Vec<Disruption>, UpstreamError> {
        let text = self.client.get_text(&self.endpoint, &[]).await?;
        let disruptions = parse_situations(&text)?;
        tracing::debug!(count = disruptions.len(), "parsed situations");
        Ok(disruptions)
    }
}

pub(crate) fn parse_situations(text: &str) -> Result<Vec<Disruption>, UpstreamError> {
    let doc = xml::parse(text)?;
    let root = doc.root_element();
    if !xml::is(root, "Siri") {
        return Err(UpstreamError::malformed(format!(
            "expected Siri root element, found {}",
            root.tag_name().name()
        )));
    }

    Ok(xml::descendants(root, "PtSituationElement")
        .filter_map(|node| match parse_situation(node) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "skipping situation");
                None
            }
        })
        .collect())
}

fn parse_situation(node: Node<'_, '_>) -> Result<Disruption, ConversionError> {
    let id = xml::descendant_text(node, "SituationNumber")
        .or_else(|| xml::descendant_text(node, "ParticipantRef"))
        .ok_or(ConversionError::MissingField("SituationNumber"))?;

    let summary = xml::localized_text(node, "Summary", PREFERRED_LANG).unwrap_or_default();
    let description = xml::localized_text(node, "Description", PREFERRED_LANG).unwrap_or(summary);
    let title = if summary.is_empty() { "Disruption" } else { summary };

    let severity = xml::descendant_text(node, "Severity")
        .map(Severity::from_siri)
        .unwrap_or(Severity::Warning);

    let affected_lines = collect_refs(node, &["LineRef"]);
    let affected_stops = collect_refs(node, &["StopPointRef", "StopPlaceRef"]);

    let (start_time, end_time) = match xml::descendant(node, "ValidityPeriod") {
        Some(period) => (
            xml::child_text(period, "StartTime").and_then(xml::parse_datetime),
            xml::child_text(period, "EndTime").and_then(xml::parse_datetime),
        ),
        None => (
            xml::descendant_text(node, "StartTime").and_then(xml::parse_datetime),
            xml::descendant_text(node, "EndTime").and_then(xml::parse_datetime),
        ),
    };

    Ok(Disruption {
        id: id.to_string(),
        title: truncate(title, MAX_TITLE_CHARS),
        description: truncate(description, MAX_DESCRIPTION_CHARS),
        severity,
        affected_lines,
        affected_stops,
        start_time,
        end_time,
    })
}

/// Distinct texts of the named elements, in document order.
fn collect_refs(node: Node<'_, '_>, names: &[&str]) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let texts = node
        .descendants()
        .filter(|n| names.iter().any(|name| xml::is(*n, name)))
        .filter_map(xml::text);
    for text in texts {
        if refs.len() == MAX_AFFECTED {
            break;
        }
        if !refs.iter().any(|r| r == text) {
            refs.push(text.to_string());
        }
    }
    refs
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
