use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::ai::UnitTranslator;
use crate::markup::{select_units, MarkupDocument, MarkupError};
use crate::time::Sleeper;

/// Per-document counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub units: usize,
    pub translated: usize,
    pub failed: usize,
    pub blank: usize,
}

impl DocumentReport {
    /// Units that went to the translation service.
    pub fn service_units(&self) -> usize {
        self.translated + self.failed
    }

    pub fn absorb(&mut self, other: &DocumentReport) {
        self.units += other.units;
        self.translated += other.translated;
        self.failed += other.failed;
        self.blank += other.blank;
    }
}

/// Drives the units of one document through a [`UnitTranslator`], strictly in order.
pub struct DocumentTranslator<T, S> {
    translator: T,
    sleeper: S,
    pacing: Duration,
}

impl<T: UnitTranslator, S: Sleeper> DocumentTranslator<T, S> {
    pub fn new(translator: T, sleeper: S, pacing: Duration) -> Self {
        Self {
            translator,
            sleeper,
            pacing,
        }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Translates every non-blank unit of `document` and writes the results back.
    ///
    /// Blank units are never sent and never touched. Consecutive service calls
    /// are separated by the pacing interval. A unit that could not be
    /// translated carries its original markup plus the failure marker; only a
    /// markup serialization error aborts the document.
    pub async fn run(
        &self,
        document: MarkupDocument,
        target_language: &str,
    ) -> Result<(MarkupDocument, DocumentReport), MarkupError> {
        let mut report = DocumentReport::default();

        for unit in select_units(&document) {
            let unit = unit?;
            report.units += 1;

            if unit.is_blank() {
                report.blank += 1;
                continue;
            }

            if report.service_units() > 0 {
                self.sleeper.sleep(self.pacing).await;
            }

            debug!("translating <{}> unit #{}", unit.tag(), unit.index());
            let outcome = self
                .translator
                .translate(unit.markup(), target_language)
                .await;
            if outcome.is_translated() {
                report.translated += 1;
            } else {
                report.failed += 1;
            }
            unit.write_back(outcome.text());
        }

        Ok((document, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{MockMode, MockTranslator, RecordingSleeper};
    use crate::ai::FAILURE_MARKER;
    use std::collections::HashMap;
    use std::sync::Arc;

    const PACING: Duration = Duration::from_millis(250);

    fn mappings(pairs: &[(&str, &str)]) -> MockMode {
        MockMode::Mappings(
            pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn run(source: &str, mode: MockMode) -> (String, DocumentReport, Vec<String>, Vec<Duration>) {
        let translator = Arc::new(MockTranslator::new(mode));
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = DocumentTranslator::new(translator.clone(), sleeper.clone(), PACING);

        let document = MarkupDocument::parse_str(source);
        let (document, report) =
            tokio_test::block_on(orchestrator.run(document, "German")).unwrap();

        (
            document.to_markup().unwrap(),
            report,
            translator.calls(),
            sleeper.recorded(),
        )
    }

    #[test]
    fn translates_paragraph_with_nested_markup() {
        let (markup, report, calls, _) = run(
            "<body><p>Hello <em>world</em></p></body>",
            mappings(&[("Hello <em>world</em>", "Hallo <em>Welt</em>")])
        );

        assert!(markup.contains("<p>Hallo <em>Welt</em></p>"));
        assert_eq!(calls, vec!["Hello <em>world</em>"]);
        assert_eq!(report.translated, 1);
    }

    #[test]
    fn whitespace_only_span_is_left_alone() {
        let (markup, report, calls, sleeps) = run(
            "<body><span>   </span></body>",
            MockMode::Prefix("[de] ".into())
        );

        assert!(markup.contains("<span>   </span>"));
        assert!(calls.is_empty());
        assert!(sleeps.is_empty());
        assert_eq!(
            report,
            DocumentReport {
                units: 1,
                translated: 0,
                failed: 0,
                blank: 1
            }
        );
    }

    #[test]
    fn units_are_sent_in_document_order_with_pacing_between() {
        let (markup, report, calls, sleeps) = run(
            "<body><h2 id=\"c1\">One</h2><p> </p><div class=\"box\"><p>Two</p></div><ul><li>Three</li></ul></body>",
            MockMode::Prefix("[de] ".into())
        );

        assert_eq!(calls, vec!["One", "Two", "Three"]);
        assert_eq!(sleeps, vec![PACING, PACING]);
        assert_eq!(report.service_units(), 3);
        assert_eq!(report.blank, 1);
        assert!(markup.contains(
            "<h2 id=\"c1\">[de] One</h2><p> </p><div class=\"box\"><p>[de] Two</p></div><ul><li>[de] Three</li></ul>"
        ));
    }

    #[test]
    fn failed_unit_does_not_stop_the_document() {
        let (markup, report, calls, _) = run(
            "<body><p>known</p><p>unknown</p><p>known</p></body>",
            mappings(&[("known", "bekannt")])
        );

        assert_eq!(calls.len(), 3);
        assert_eq!(report.translated, 2);
        assert_eq!(report.failed, 1);
        assert!(markup.contains(&format!(
            "<p>bekannt</p><p>unknown {FAILURE_MARKER}</p><p>bekannt</p>"
        )
        .replace('\'', "\"")));
    }

    #[test]
    fn nested_units_are_sent_once_and_every_failure_is_visible() {
        let (markup, report, calls, _) = run(
            "<body><p>Outer <span>inner</span></p><ul><li>Item <p>para</p></li></ul></body>",
            MockMode::Fail
        );

        assert_eq!(calls, vec!["Outer <span>inner</span>", "Item <p>para</p>"]);
        assert_eq!(report.failed, 2);
        assert_eq!(markup.matches("Translation failed").count(), report.failed);
    }
}
