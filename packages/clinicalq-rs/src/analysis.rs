//! Clinical scoring of a captured session
//!
//! The orchestrator hands the finished [`SessionRecord`] to a
//! [`SessionAnalyzer`] and only looks at how many metrics came back and how
//! many fell out of range. [`ClinicalAnalyzer`] implements the ClinicalQ rule
//! table: per-site conditions are resolved from the captured epochs, turned
//! into ratios and percentage changes, and compared against reference ranges.
//!
//! A metric whose inputs were not captured (or whose denominator is zero) is
//! reported as [`MetricStatus::Missing`] with a `null` value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::Result;
use crate::protocol::MASTER_SEQUENCE;
use crate::types::{AcquisitionMode, ChannelMap, EpochCapture, FeatureVector, SessionRecord};

/// Outcome of comparing a metric against its reference range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    InRange,
    OutOfRange,
    Missing,
}

/// One scored clinical metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub location: String,
    pub metric: String,
    pub value: Option<f64>,
    pub normal_range: String,
    pub status: MetricStatus,
    /// Follow-up question for the clinician; empty when nothing to ask
    pub probe: String,
    pub formula: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub in_range: usize,
    pub out_of_range: usize,
    pub missing: usize,
    /// Distinct probes of out-of-range metrics, in metric order
    pub potential_symptom_questions: Vec<String>,
}

/// Condition averages per site, e.g. `conditions["Cz"]["EO"]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedConditions {
    pub conditions: BTreeMap<String, BTreeMap<String, FeatureVector>>,
}

/// What an analyzer returns to the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metrics: Vec<MetricResult>,
    pub summary: AnalysisSummary,
    pub derived: DerivedConditions,
}

impl AnalysisReport {
    pub fn from_metrics(metrics: Vec<MetricResult>, derived: DerivedConditions) -> Self {
        let count = |status: MetricStatus| metrics.iter().filter(|m| m.status == status).count();

        let mut seen = BTreeSet::new();
        let potential_symptom_questions = metrics
            .iter()
            .filter(|m| m.status == MetricStatus::OutOfRange && !m.probe.is_empty())
            .filter(|m| seen.insert(m.probe.clone()))
            .map(|m| m.probe.clone())
            .collect();

        let summary = AnalysisSummary {
            in_range: count(MetricStatus::InRange),
            out_of_range: count(MetricStatus::OutOfRange),
            missing: count(MetricStatus::Missing),
            potential_symptom_questions,
        };

        Self {
            metrics,
            summary,
            derived,
        }
    }
}

/// External clinical-analysis collaborator
pub trait SessionAnalyzer: Send + Sync {
    fn analyze(&self, record: &SessionRecord) -> AnalysisReport;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub mode: AcquisitionMode,
    pub sampling_rate: u32,
    pub epoch_seconds: u32,
    pub channels: ChannelMap,
}

/// Persisted outcome of a complete session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub id: String,
    pub created_at: String,
    pub metadata: SessionMetadata,
    pub metrics: Vec<MetricResult>,
    pub summary: AnalysisSummary,
    pub derived: DerivedConditions,
    pub epoch_features: Vec<EpochCapture>,
}

impl SessionResult {
    pub fn new(record: SessionRecord, report: AnalysisReport) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            metadata: SessionMetadata {
                mode: record.mode,
                sampling_rate: record.sampling_rate,
                epoch_seconds: record.epoch_seconds,
                channels: record.channels,
            },
            metrics: report.metrics,
            summary: report.summary,
            derived: report.derived,
            epoch_features: record.epochs,
        }
    }

    /// Write as JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        std::fs::write(path, json)?;
        log::info!("Session result {} written to {}", self.id, path.display());
        Ok(())
    }
}

// =============================================================================
// RULE EVALUATION
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Criterion {
    Below(f64),
    Above(f64),
    AtMost(f64),
    Between(f64, f64),
}

impl Criterion {
    fn status(self, value: Option<f64>) -> MetricStatus {
        let Some(v) = value.filter(|v| v.is_finite()) else {
            return MetricStatus::Missing;
        };
        let ok = match self {
            Criterion::Below(limit) => v < limit,
            Criterion::Above(limit) => v > limit,
            Criterion::AtMost(limit) => v <= limit,
            Criterion::Between(low, high) => (low..=high).contains(&v),
        };
        if ok {
            MetricStatus::InRange
        } else {
            MetricStatus::OutOfRange
        }
    }
}

struct Rule<'a> {
    location: &'a str,
    metric: &'a str,
    normal_range: &'a str,
    formula: &'a str,
    criterion: Criterion,
}

impl Rule<'_> {
    /// Score `value`; `probe` sees the status and value whenever a value exists
    fn evaluate<F>(&self, value: Option<f64>, probe: F) -> MetricResult
    where
        F: FnOnce(MetricStatus, f64) -> String,
    {
        let value = value.filter(|v| v.is_finite());
        let status = self.criterion.status(value);
        let probe = value.map(|v| probe(status, v)).unwrap_or_default();
        MetricResult {
            location: self.location.to_string(),
            metric: self.metric.to_string(),
            value,
            normal_range: self.normal_range.to_string(),
            status,
            probe,
            formula: self.formula.to_string(),
        }
    }
}

/// Fixed probe text, attached only when out of range
fn when_out(text: &'static str) -> impl FnOnce(MetricStatus, f64) -> String {
    move |status, _| {
        if status == MetricStatus::OutOfRange {
            text.to_string()
        } else {
            String::new()
        }
    }
}

fn probe_join(items: &[&str]) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    let (num, den) = (num?, den?);
    (den != 0.0).then(|| num / den)
}

fn pct_change(new_value: Option<f64>, base: Option<f64>) -> Option<f64> {
    let (new_value, base) = (new_value?, base?);
    (base != 0.0).then(|| (new_value - base) / base * 100.0)
}

fn pct_drop(before: Option<f64>, after: Option<f64>) -> Option<f64> {
    let (before, after) = (before?, after?);
    (before != 0.0).then(|| (before - after) / before * 100.0)
}

// =============================================================================
// CONDITION RESOLUTION
// =============================================================================

/// Condition name to averaged features for one site
type Conditions = BTreeMap<&'static str, FeatureVector>;

struct EpochIndex<'a> {
    epochs: &'a [EpochCapture],
}

impl<'a> EpochIndex<'a> {
    fn sequences_with(&self, location: &str) -> BTreeSet<&'a str> {
        self.epochs
            .iter()
            .filter(|e| e.features.contains_key(location))
            .map(|e| e.sequence.as_str())
            .collect()
    }

    fn matching<'s>(
        &'s self,
        location: &'s str,
        sequence: &'s str,
        pred: impl Fn(&EpochCapture) -> bool + 's,
    ) -> impl Iterator<Item = &'a FeatureVector> + 's {
        self.epochs
            .iter()
            .filter(move |e| e.sequence == sequence && pred(*e))
            .filter_map(move |e| e.features.get(location))
    }

    fn at_index(&self, location: &str, sequence: &str, index: u32) -> Option<FeatureVector> {
        self.matching(location, sequence, |e| e.index == index)
            .next()
            .copied()
    }

    fn with_label(&self, location: &str, sequence: &str, label: &str) -> Option<FeatureVector> {
        self.matching(location, sequence, |e| e.label == label)
            .next()
            .copied()
    }

    /// Own sequence if the site was recorded on its own, else MASTER
    fn sequence_for(&self, location: &'a str) -> &'a str {
        if self.sequences_with(location).contains(location) {
            location
        } else {
            MASTER_SEQUENCE
        }
    }

    /// EO (mean of epochs 1 and 2), EC (epoch 3) and EO_AFTER (epoch 4)
    fn baseline_conditions(&self, location: &'a str) -> Conditions {
        let seq = self.sequence_for(location);
        let mut conditions = Conditions::new();

        let eo_rows: Vec<FeatureVector> = [1, 2]
            .iter()
            .filter_map(|&i| self.at_index(location, seq, i))
            .collect();
        if let Some(eo) = FeatureVector::mean(&eo_rows) {
            conditions.insert("EO", eo);
        }
        if let Some(ec) = self.at_index(location, seq, 3) {
            conditions.insert("EC", ec);
        }
        if let Some(after) = self.at_index(location, seq, 4) {
            conditions.insert("EO_AFTER", after);
        }
        conditions
    }

    fn cz_conditions(&self) -> Conditions {
        let location = "Cz";
        let seq = self.sequence_for(location);
        let mut conditions = self.baseline_conditions(location);

        let under_task =
            FeatureVector::mean(self.matching(location, seq, |e| matches!(e.label.as_str(), "READ" | "COUNT")));
        if let Some(ut) = under_task {
            conditions.insert("UT", ut);
        }
        if let Some(omni) = self.with_label(location, seq, "OMNI") {
            conditions.insert("OMNI", omni);
        }
        conditions
    }

    /// Eyes-closed features of a frontal site
    fn frontal_ec(&self, location: &str) -> Option<FeatureVector> {
        if self.sequences_with(location).contains(location) {
            return self.at_index(location, location, 1);
        }
        self.with_label(location, MASTER_SEQUENCE, "FRONTAL_EC")
            .or_else(|| self.with_label(location, MASTER_SEQUENCE, "EC"))
    }
}

// =============================================================================
// CLINICAL ANALYZER
// =============================================================================

/// Default ClinicalQ rule table
#[derive(Debug, Default, Clone, Copy)]
pub struct ClinicalAnalyzer;

impl SessionAnalyzer for ClinicalAnalyzer {
    fn analyze(&self, record: &SessionRecord) -> AnalysisReport {
        let index = EpochIndex {
            epochs: &record.epochs,
        };

        let cz = index.cz_conditions();
        let o1 = index.baseline_conditions("O1");
        let f3 = index.frontal_ec("F3");
        let f4 = index.frontal_ec("F4");
        let fz = index.frontal_ec("Fz");

        let mut metrics = Vec::new();
        metrics.extend(analyze_cz(&cz));
        metrics.extend(analyze_o1(&o1));
        metrics.extend(analyze_frontal_pair(f3.as_ref(), f4.as_ref()));
        metrics.extend(analyze_fz(fz.as_ref()));

        let mut derived = DerivedConditions::default();
        let own = |c: &Conditions| -> BTreeMap<String, FeatureVector> {
            c.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        derived.conditions.insert("Cz".to_string(), own(&cz));
        derived.conditions.insert("O1".to_string(), own(&o1));
        for (site, ec) in [("F3", f3), ("F4", f4), ("Fz", fz)] {
            let entry = ec.into_iter().map(|v| ("EC".to_string(), v)).collect();
            derived.conditions.insert(site.to_string(), entry);
        }

        let report = AnalysisReport::from_metrics(metrics, derived);
        log::info!(
            "Analysis: {} metrics, {} in range, {} out of range, {} missing",
            report.metrics.len(),
            report.summary.in_range,
            report.summary.out_of_range,
            report.summary.missing
        );
        report
    }
}

fn field(conditions: &Conditions, name: &str, get: fn(&FeatureVector) -> f64) -> Option<f64> {
    conditions.get(name).map(get)
}

const SLUGGISH: &str = "Ask about mental sluggishness.";
const ADHD_LIKE: &str = "If >3.0, ask about ADHD-like presentation.";

fn peak_alpha_rule<'a>(location: &'a str, metric: &'a str, formula: &'a str) -> Rule<'a> {
    Rule {
        location,
        metric,
        normal_range: "> 9.5 Hz",
        formula,
        criterion: Criterion::Above(9.5),
    }
}

fn analyze_cz(c: &Conditions) -> Vec<MetricResult> {
    let alpha = |n| field(c, n, |f| f.alpha);
    let theta = |n| field(c, n, |f| f.theta);
    let beta = |n| field(c, n, |f| f.beta);

    let alpha_response = pct_change(alpha("EC"), alpha("EO"));
    let alpha_recovery = pct_drop(alpha("EO"), alpha("EO_AFTER"));
    let theta_smr = ratio(theta("EC"), field(c, "EC", |f| f.smr));
    let tb_eo = ratio(theta("EO"), beta("EO"));
    let tb_ut = ratio(theta("UT"), beta("UT"));
    let beta_fatigue = pct_drop(beta("EO"), beta("UT"));
    let tb_challenge_shift = pct_drop(tb_eo, tb_ut);
    let theta_omni_change = pct_change(theta("OMNI"), theta("EO"));
    let total_amp_ec = field(c, "EC", |f| f.total_amp_basic);
    let peak_alpha_ec = field(c, "EC", |f| f.peak_alpha);
    let peak_alpha_eo = field(c, "EO", |f| f.peak_alpha);

    vec![
        Rule {
            location: "Cz",
            metric: "Alpha response %",
            normal_range: "> 30%",
            formula: "(Alpha_EC - Alpha_EO) / Alpha_EO * 100",
            criterion: Criterion::Above(30.0),
        }
        .evaluate(
            alpha_response,
            when_out("Ask about visual processing and short-term retention issues; screen for recent severe emotional stressors."),
        ),
        Rule {
            location: "Cz",
            metric: "Alpha recovery %",
            normal_range: "< 25%",
            formula: "(Alpha_EO_before - Alpha_EO_after) / Alpha_EO_before * 100",
            criterion: Criterion::Below(25.0),
        }
        .evaluate(
            alpha_recovery,
            when_out("Ask about foggy thinking, cognitive decline, sleep disturbance, medication effects, sleep deprivation, or marijuana use."),
        ),
        Rule {
            location: "Cz",
            metric: "Theta/SMR (EC)",
            normal_range: "< 3.0",
            formula: "Theta_EC / SMR_EC",
            criterion: Criterion::Below(3.0),
        }
        .evaluate(
            theta_smr,
            when_out("Ask about inability to sit still, sleep onset issues, headaches/chronic pain, tremor, dystonia, and motor-linked seizure features."),
        ),
        Rule {
            location: "Cz",
            metric: "Theta/Beta (EO)",
            normal_range: "< 2.2",
            formula: "Theta_EO / Beta_EO",
            criterion: Criterion::Below(2.2),
        }
        .evaluate(tb_eo, |status, v| {
            if status != MetricStatus::OutOfRange {
                return String::new();
            }
            let base = "Ask about focus and attention inefficiency (CADD profile).";
            if v > 3.0 {
                probe_join(&[base, ADHD_LIKE])
            } else {
                base.to_string()
            }
        }),
        Rule {
            location: "Cz",
            metric: "Theta/Beta (UT)",
            normal_range: "< 2.2",
            formula: "Theta_UT / Beta_UT",
            criterion: Criterion::Below(2.2),
        }
        .evaluate(tb_ut, |status, v| {
            if status != MetricStatus::OutOfRange {
                return String::new();
            }
            let mut parts = vec!["Ask about CADD traits and fatigue under cognitive load."];
            if v > 3.0 {
                parts.push(ADHD_LIKE);
            }
            if tb_eo.is_some_and(|eo| eo < 2.2) {
                parts.push("If EO is normal but task ratio is high, ask about reading comprehension/retention and task fatigue.");
            }
            probe_join(&parts)
        }),
        Rule {
            location: "Cz",
            metric: "Beta fatigue %",
            normal_range: "< 15%",
            formula: "(Beta_EO - Beta_UT) / Beta_EO * 100",
            criterion: Criterion::Below(15.0),
        }
        .evaluate(
            beta_fatigue,
            when_out("Ask whether reading/problem solving quickly causes fatigue."),
        ),
        Rule {
            location: "Cz",
            metric: "T/B challenge shift %",
            normal_range: "< 15%",
            formula: "(T/B_EO - T/B_UT) / (T/B_EO) * 100",
            criterion: Criterion::Below(15.0),
        }
        .evaluate(
            tb_challenge_shift,
            when_out("Ask about CADD if task-related shift is elevated."),
        ),
        Rule {
            location: "Cz",
            metric: "Theta Omni % change",
            normal_range: "< -5%",
            formula: "(Theta_Omni - Theta_EO) / Theta_EO * 100",
            criterion: Criterion::Below(-5.0),
        }
        .evaluate(theta_omni_change, |status, v| match status {
            MetricStatus::OutOfRange if v > 0.0 => {
                "Theta increased with Omni/UCS; avoid prescribing that sound for home use.".to_string()
            }
            MetricStatus::OutOfRange => {
                "Theta did not reduce enough with Omni/UCS; review sound protocol suitability.".to_string()
            }
            _ => String::new(),
        }),
        Rule {
            location: "Cz",
            metric: "Total amplitude (EC)",
            normal_range: "< 60 uV",
            formula: "Theta_EC + Alpha_EC + Beta_EC",
            criterion: Criterion::Below(60.0),
        }
        .evaluate(
            total_amp_ec,
            when_out("Ask about developmental delay, autism-spectrum behaviors, and marked cognitive deficits."),
        ),
        peak_alpha_rule("Cz", "Peak alpha frequency (EC)", "Peak frequency of Alpha_EC")
            .evaluate(peak_alpha_ec, when_out(SLUGGISH)),
        peak_alpha_rule("Cz", "Peak alpha frequency (EO)", "Peak frequency of Alpha_EO")
            .evaluate(peak_alpha_eo, when_out(SLUGGISH)),
    ]
}

fn analyze_o1(c: &Conditions) -> Vec<MetricResult> {
    let alpha = |n| field(c, n, |f| f.alpha);
    let theta = |n| field(c, n, |f| f.theta);
    let beta = |n| field(c, n, |f| f.beta);

    let alpha_response = pct_change(alpha("EC"), alpha("EO"));
    let alpha_recovery = pct_drop(alpha("EO"), alpha("EO_AFTER"));
    let tb_eo = ratio(theta("EO"), beta("EO"));
    let tb_ec = ratio(theta("EC"), beta("EC"));
    let tb_shift = pct_change(tb_ec, tb_eo);
    let total_amp_ec = field(c, "EC", |f| f.total_amp_basic);
    let peak_alpha_ec = field(c, "EC", |f| f.peak_alpha);
    let peak_alpha_eo = field(c, "EO", |f| f.peak_alpha);

    vec![
        Rule {
            location: "O1",
            metric: "Alpha response %",
            normal_range: "> 50%",
            formula: "(Alpha_EC - Alpha_EO) / Alpha_EO * 100",
            criterion: Criterion::Above(50.0),
        }
        .evaluate(alpha_response, |status, v| match status {
            MetricStatus::OutOfRange => {
                "Ask about traumatic stress and poor retention of information.".to_string()
            }
            _ if v >= 150.0 => {
                "Very high alpha response can correlate with strong artistic/visual-spatial interests."
                    .to_string()
            }
            _ => String::new(),
        }),
        Rule {
            location: "O1",
            metric: "Alpha recovery %",
            normal_range: "< 25%",
            formula: "(Alpha_EO_before - Alpha_EO_after) / Alpha_EO_before * 100",
            criterion: Criterion::Below(25.0),
        }
        .evaluate(
            alpha_recovery,
            when_out("Ask about foggy thinking, cognitive decline, sleep issues, and medication effects."),
        ),
        Rule {
            location: "O1",
            metric: "Theta/Beta (EO)",
            normal_range: "1.8-2.2",
            formula: "Theta_EO / Beta_EO",
            criterion: Criterion::Between(1.8, 2.2),
        }
        .evaluate(tb_eo, |status, v| {
            if status != MetricStatus::OutOfRange {
                return String::new();
            }
            if v < 1.8 {
                let base = "Ask about poor stress tolerance, racing thoughts, anxiety, self-quieting difficulty, sleep problems, and depressive symptoms.";
                if v < 1.2 {
                    probe_join(&[
                        base,
                        "Markedly low ratio: ask about self-medication tendencies and GAD-like profile.",
                    ])
                } else {
                    base.to_string()
                }
            } else if v > 3.0 {
                "Ask about cognitive deficiencies or Asperger-like patterning; cross-check F3/F4 Beta findings.".to_string()
            } else {
                "Outside normative theta/beta range; correlate with stress regulation and cognition complaints.".to_string()
            }
        }),
        Rule {
            location: "O1",
            metric: "Theta/Beta (EC)",
            normal_range: "1.8-2.2",
            formula: "Theta_EC / Beta_EC",
            criterion: Criterion::Between(1.8, 2.2),
        }
        .evaluate(tb_ec, |status, v| {
            if status != MetricStatus::OutOfRange {
                String::new()
            } else if v <= 1.5 {
                "Low EC theta/beta can track sleep disturbance; compare with EO findings.".to_string()
            } else if v > 3.0 {
                "High EC theta/beta can suggest cognitive inefficiency; consider Asperger-like pattern probes.".to_string()
            } else {
                "Outside normative EC theta/beta range; correlate clinically with stress/sleep/cognition profile.".to_string()
            }
        }),
        Rule {
            location: "O1",
            metric: "T/B EO->EC shift %",
            normal_range: "> -25%",
            formula: "(T/B_EC - T/B_EO) / (T/B_EO) * 100",
            criterion: Criterion::Above(-25.0),
        }
        .evaluate(tb_shift, |status, v| match status {
            MetricStatus::OutOfRange => "If < -25%, ask about sleep-onset difficulties.".to_string(),
            _ if v > 0.0 => "Positive value indicates theta/beta increased from EO to EC.".to_string(),
            _ => String::new(),
        }),
        Rule {
            location: "O1",
            metric: "Total amplitude (EC)",
            normal_range: "< 60 uV",
            formula: "Theta_EC + Alpha_EC + Beta_EC",
            criterion: Criterion::Below(60.0),
        }
        .evaluate(
            total_amp_ec,
            when_out("Ask about developmental delay, autism-spectrum features, and marked cognitive deficits."),
        ),
        peak_alpha_rule("O1", "Peak alpha frequency (EC)", "Peak frequency of Alpha_EC")
            .evaluate(peak_alpha_ec, when_out(SLUGGISH)),
        peak_alpha_rule("O1", "Peak alpha frequency (EO)", "Peak frequency of Alpha_EO")
            .evaluate(peak_alpha_eo, when_out(SLUGGISH)),
    ]
}

fn analyze_frontal_pair(f3: Option<&FeatureVector>, f4: Option<&FeatureVector>) -> Vec<MetricResult> {
    let mut out = Vec::new();

    for (location, data) in [("F3", f3), ("F4", f4)] {
        let theta = data.map(|f| f.theta);
        let tb = ratio(theta, data.map(|f| f.beta));
        let ta = ratio(theta, data.map(|f| f.alpha));
        let total = data.map(|f| f.total_amp_basic);

        out.push(
            Rule {
                location,
                metric: "Theta/Beta (EC)",
                normal_range: "< 2.2",
                formula: "Theta_EC / Beta_EC",
                criterion: Criterion::Below(2.2),
            }
            .evaluate(
                tb,
                when_out("Ask about retrieval deficits, impulse control difficulty, emotional volatility, depression (adults), or impulse control (children)."),
            ),
        );

        out.push(
            Rule {
                location,
                metric: "Theta/Alpha (EC)",
                normal_range: "1.2-1.6",
                formula: "Theta_EC / Alpha_EC",
                criterion: Criterion::Between(1.2, 1.6),
            }
            .evaluate(ta, |status, v| {
                if status != MetricStatus::OutOfRange {
                    return String::new();
                }
                if v < 1.0 {
                    let base = "Ask about frontal Alpha ADD profile: organization, sequencing, sustained focus, planning, completion, and talkativeness.";
                    if v < 0.8 {
                        probe_join(&[
                            base,
                            "Markedly low ratio: probe fibromyalgia, chronic fatigue, and sleep disturbance.",
                        ])
                    } else {
                        base.to_string()
                    }
                } else {
                    "Outside frontal theta/alpha target range; correlate with executive function complaints.".to_string()
                }
            }),
        );

        out.push(
            Rule {
                location,
                metric: "Total amplitude (EC)",
                normal_range: "< 60 uV",
                formula: "Theta_EC + Alpha_EC + Beta_EC",
                criterion: Criterion::Below(60.0),
            }
            .evaluate(
                total,
                when_out("Ask about developmental delays, autism-spectrum behavior, and memory/cognitive deficits."),
            ),
        );
    }

    let bands: [(&str, &str, fn(&FeatureVector) -> f64); 3] = [
        ("Theta", "theta", |f| f.theta),
        ("Alpha", "alpha", |f| f.alpha),
        ("Beta", "beta", |f| f.beta),
    ];
    for (title, band, get) in bands {
        let asymmetry = match (f3.map(get), f4.map(get)) {
            (Some(left), Some(right)) => {
                let mean = (left + right) / 2.0;
                (mean != 0.0).then(|| (right - left).abs() / mean * 100.0)
            }
            _ => None,
        };
        let metric = format!("{} asymmetry %", title);
        let formula = format!(
            "abs(F4_{band} - F3_{band}) / mean(F3_{band}, F4_{band}) * 100",
            band = band
        );
        out.push(
            Rule {
                location: "F3/F4",
                metric: &metric,
                normal_range: "<= 15% diff (practical equality check)",
                formula: &formula,
                criterion: Criterion::AtMost(15.0),
            }
            .evaluate(
                asymmetry,
                when_out("Frontal asymmetry exceeds expected parity; correlate with executive/emotional regulation history."),
            ),
        );
    }

    out
}

fn analyze_fz(fz: Option<&FeatureVector>) -> Vec<MetricResult> {
    let delta = fz.map(|f| f.delta);
    let hibeta_beta = ratio(fz.map(|f| f.hibeta), fz.map(|f| f.beta));
    let hibeta_plus_beta = fz.map(|f| f.hibeta_plus_beta);
    let lo_hi_alpha = ratio(fz.map(|f| f.lo_alpha), fz.map(|f| f.hi_alpha));
    let peak_alpha = fz.map(|f| f.peak_alpha);

    vec![
        Rule {
            location: "Fz",
            metric: "Delta (EC)",
            normal_range: "< 9.0 uV",
            formula: "Delta_EC",
            criterion: Criterion::Below(9.0),
        }
        .evaluate(
            delta,
            when_out("Ask about concentration, forgetfulness, comprehension deficits; consider developmental delay or pain context with F3/F4 findings."),
        ),
        Rule {
            location: "Fz",
            metric: "HiBeta/Beta (EC)",
            normal_range: "0.45-0.55",
            formula: "HiBeta_EC / Beta_EC",
            criterion: Criterion::Between(0.45, 0.55),
        }
        .evaluate(hibeta_beta, |status, v| {
            let text = if status != MetricStatus::OutOfRange {
                ""
            } else if v < 0.35 {
                "Very low ratio: problematic passivity profile."
            } else if v < 0.45 {
                "Ask about passiveness; if <0.40, ask about anxiety despite low ratio profile."
            } else if v > 0.80 {
                "High ratio: ask about obsessive/compulsive behavior."
            } else if v > 0.60 {
                "Ask about anxiety and perseverative behavior."
            } else {
                "Ask about stubbornness, OC tendencies/OCD, perseveration, and potential hot midline pattern."
            };
            text.to_string()
        }),
        Rule {
            location: "Fz",
            metric: "HiBeta + Beta (EC)",
            normal_range: "< 15 uV",
            formula: "HiBeta_EC + Beta_EC",
            criterion: Criterion::Below(15.0),
        }
        .evaluate(hibeta_plus_beta, |status, _| {
            if status != MetricStatus::OutOfRange {
                String::new()
            } else if hibeta_beta.is_some_and(|r| (0.45..=0.55).contains(&r)) {
                "If sum >15 with normal ratio, ask about fretting and treat as hot midline.".to_string()
            } else {
                "Sum >15 suggests hot midline; ask about autism-spectrum behavior and related perseveration.".to_string()
            }
        }),
        Rule {
            location: "Fz",
            metric: "LoAlpha/HiAlpha (EC)",
            normal_range: "< 1.5",
            formula: "LoAlpha_EC / HiAlpha_EC",
            criterion: Criterion::Below(1.5),
        }
        .evaluate(lo_hi_alpha, |status, v| {
            if status != MetricStatus::OutOfRange {
                return String::new();
            }
            let base = "Ask about cognitive inefficiency, age-related memory/cognitive slowing, sleep issues, concentration, and forgetfulness.";
            if v > 2.2 {
                probe_join(&[
                    base,
                    "Markedly high ratio: probe developmental delay and significant cognitive deficits.",
                ])
            } else {
                base.to_string()
            }
        }),
        peak_alpha_rule("Fz", "Peak alpha frequency (EC)", "Peak frequency of Alpha_EC")
            .evaluate(peak_alpha, when_out(SLUGGISH)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(theta: f64, alpha: f64, beta: f64) -> FeatureVector {
        FeatureVector {
            theta,
            alpha,
            beta,
            smr: 3.0,
            delta: 2.0,
            lo_alpha: 3.0,
            hi_alpha: 2.5,
            hibeta: 2.0,
            total_amp_basic: theta + alpha + beta,
            hibeta_plus_beta: 2.0 + beta,
            peak_alpha: 10.0,
        }
    }

    fn epoch(sequence: &str, index: u32, label: &str, location: &str, f: FeatureVector) -> EpochCapture {
        EpochCapture {
            sequence: sequence.to_string(),
            index,
            label: label.to_string(),
            instruction: String::new(),
            seconds: 15,
            features: [(location.to_string(), f)].into_iter().collect(),
        }
    }

    fn record(mode: AcquisitionMode, epochs: Vec<EpochCapture>) -> SessionRecord {
        SessionRecord {
            mode,
            sampling_rate: 250,
            epoch_seconds: 15,
            channels: [("Cz", 1), ("O1", 2), ("Fz", 3), ("F3", 4), ("F4", 5)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            epochs,
        }
    }

    fn sequential_fixture() -> SessionRecord {
        let mut cz_ec = feature(9.0, 15.0, 4.0);
        cz_ec.smr = 2.2;
        cz_ec.peak_alpha = 9.8;
        let mut fz = feature(6.0, 9.0, 8.0);
        fz.delta = 10.0;
        fz.lo_alpha = 4.0;
        fz.hi_alpha = 2.0;
        fz.hibeta = 5.0;
        fz.hibeta_plus_beta = 13.0;
        fz.peak_alpha = 9.0;

        record(
            AcquisitionMode::Sequential,
            vec![
                epoch("Cz", 1, "EO", "Cz", feature(8.0, 10.0, 5.0)),
                epoch("Cz", 2, "EO", "Cz", feature(8.0, 10.0, 5.0)),
                epoch("Cz", 3, "EC", "Cz", cz_ec),
                epoch("Cz", 4, "EO", "Cz", feature(8.0, 7.0, 5.0)),
                epoch("Cz", 5, "READ", "Cz", feature(11.0, 8.0, 3.0)),
                epoch("Cz", 6, "OMNI", "Cz", feature(9.0, 9.0, 5.0)),
                epoch("Cz", 7, "COUNT", "Cz", feature(11.0, 8.0, 3.0)),
                epoch("Cz", 8, "EO", "Cz", feature(8.0, 9.0, 5.0)),
                epoch("O1", 1, "EO", "O1", feature(6.0, 8.0, 3.0)),
                epoch("O1", 2, "EO", "O1", feature(6.0, 8.0, 3.0)),
                epoch("O1", 3, "EC", "O1", feature(5.0, 18.0, 4.0)),
                epoch("O1", 4, "EO", "O1", feature(6.0, 5.0, 3.0)),
                epoch("F3", 1, "EC", "F3", feature(6.0, 5.0, 2.0)),
                epoch("F4", 1, "EC", "F4", feature(5.0, 10.0, 3.0)),
                epoch("Fz", 1, "EC", "Fz", fz),
            ],
        )
    }

    fn find<'a>(report: &'a AnalysisReport, location: &str, metric: &str) -> &'a MetricResult {
        report
            .metrics
            .iter()
            .find(|m| m.location == location && m.metric == metric)
            .unwrap()
    }

    #[test]
    fn test_full_session_produces_metrics_and_probes() {
        let report = ClinicalAnalyzer.analyze(&sequential_fixture());
        assert_eq!(report.metrics.len(), 33);
        assert!(report.summary.in_range > 0);
        assert!(report.summary.out_of_range > 0);
        assert_eq!(
            report.summary.in_range + report.summary.out_of_range + report.summary.missing,
            33
        );
        assert!(report
            .summary
            .potential_symptom_questions
            .iter()
            .any(|p| p.to_lowercase().contains("sleep")));

        let response = find(&report, "Cz", "Alpha response %");
        assert!((response.value.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(response.status, MetricStatus::InRange);
        assert!(response.probe.is_empty());

        let recovery = find(&report, "Cz", "Alpha recovery %");
        assert!((recovery.value.unwrap() - 30.0).abs() < 1e-9);
        assert_eq!(recovery.status, MetricStatus::OutOfRange);
    }

    #[test]
    fn test_graded_probes() {
        let report = ClinicalAnalyzer.analyze(&sequential_fixture());

        let tb_ut = find(&report, "Cz", "Theta/Beta (UT)");
        assert_eq!(tb_ut.status, MetricStatus::OutOfRange);
        assert!(tb_ut.probe.contains("ADHD-like"));
        assert!(tb_ut.probe.contains("reading comprehension"));
        assert_eq!(tb_ut.probe.matches(" | ").count(), 2);

        let omni = find(&report, "Cz", "Theta Omni % change");
        assert!((omni.value.unwrap() - 12.5).abs() < 1e-9);
        assert!(omni.probe.starts_with("Theta increased"));

        let lo_hi = find(&report, "Fz", "LoAlpha/HiAlpha (EC)");
        assert!((lo_hi.value.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(lo_hi.status, MetricStatus::OutOfRange);
        assert!(!lo_hi.probe.contains(" | "));
    }

    #[test]
    fn test_o1_shift_below_threshold() {
        let report = ClinicalAnalyzer.analyze(&sequential_fixture());
        // T/B 2.0 (EO) -> 1.25 (EC) is a -37.5% shift
        let shift = find(&report, "O1", "T/B EO->EC shift %");
        assert!((shift.value.unwrap() + 37.5).abs() < 1e-9);
        assert_eq!(shift.status, MetricStatus::OutOfRange);
        assert!(shift.probe.contains("sleep-onset"));
        assert!(report
            .summary
            .potential_symptom_questions
            .contains(&shift.probe));
    }

    #[test]
    fn test_in_range_probe_is_kept_but_not_summarized() {
        let rec = record(
            AcquisitionMode::Sequential,
            vec![
                epoch("O1", 1, "EO", "O1", feature(4.0, 8.0, 4.0)),
                epoch("O1", 3, "EC", "O1", feature(6.0, 24.0, 4.0)),
            ],
        );
        let report = ClinicalAnalyzer.analyze(&rec);

        let response = find(&report, "O1", "Alpha response %");
        assert_eq!(response.status, MetricStatus::InRange);
        assert!(response.probe.contains("artistic"));

        let shift = find(&report, "O1", "T/B EO->EC shift %");
        assert_eq!(shift.status, MetricStatus::InRange);
        assert!(shift.probe.starts_with("Positive value"));

        let questions = &report.summary.potential_symptom_questions;
        assert!(!questions.contains(&shift.probe));
        assert!(!questions.contains(&response.probe));
    }

    #[test]
    fn test_frontal_asymmetry() {
        let report = ClinicalAnalyzer.analyze(&sequential_fixture());
        let theta = find(&report, "F3/F4", "Theta asymmetry %");
        // |5 - 6| / 5.5 * 100
        assert!((theta.value.unwrap() - 100.0 / 5.5).abs() < 1e-9);
        assert_eq!(theta.status, MetricStatus::OutOfRange);
        assert!(theta.formula.contains("F4_theta"));
    }

    #[test]
    fn test_empty_session_is_all_missing() {
        let report = ClinicalAnalyzer.analyze(&record(AcquisitionMode::Sequential, vec![]));
        assert_eq!(report.metrics.len(), 33);
        assert_eq!(report.summary.missing, 33);
        assert!(report.metrics.iter().all(|m| m.value.is_none() && m.probe.is_empty()));
        assert!(report.summary.potential_symptom_questions.is_empty());
    }

    #[test]
    fn test_missing_condition_is_not_treated_as_zero() {
        // EO present, EC absent: response must be MISSING rather than -100%
        let rec = record(
            AcquisitionMode::Sequential,
            vec![epoch("Cz", 1, "EO", "Cz", feature(8.0, 10.0, 5.0))],
        );
        let report = ClinicalAnalyzer.analyze(&rec);
        let response = find(&report, "Cz", "Alpha response %");
        assert_eq!(response.status, MetricStatus::Missing);
        assert!(response.value.is_none());
        assert_eq!(find(&report, "Cz", "Theta/Beta (EO)").status, MetricStatus::InRange);
    }

    #[test]
    fn test_simultaneous_uses_master_and_frontal_baseline() {
        let mut epochs = Vec::new();
        for (index, label) in [(1, "EO"), (2, "EO"), (3, "EC"), (4, "EO"), (11, "FRONTAL_EC")] {
            let mut e = epoch(MASTER_SEQUENCE, index, label, "Cz", feature(8.0, 10.0, 5.0));
            for site in ["O1", "Fz", "F3", "F4"] {
                let alpha = if label == "FRONTAL_EC" { 20.0 } else { 10.0 };
                e.features.insert(site.to_string(), feature(6.0, alpha, 3.0));
            }
            epochs.push(e);
        }
        let report = ClinicalAnalyzer.analyze(&record(AcquisitionMode::Simultaneous, epochs));

        let ta = find(&report, "F3", "Theta/Alpha (EC)");
        assert!((ta.value.unwrap() - 0.3).abs() < 1e-9);
        assert!(ta.probe.contains("fibromyalgia"));

        assert!(report.derived.conditions["O1"].contains_key("EO"));
        assert!(report.derived.conditions["Cz"].get("UT").is_none());
        assert_eq!(report.derived.conditions["Fz"]["EC"].alpha, 20.0);
    }

    #[test]
    fn test_session_result_save() {
        let rec = sequential_fixture();
        let report = ClinicalAnalyzer.analyze(&rec);
        let result = SessionResult::new(rec, report);
        assert_eq!(result.epoch_features.len(), 15);
        assert!(uuid::Uuid::parse_str(&result.id).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("session.json");
        result.save(&path, true).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["mode"], "sequential");
        assert_eq!(value["metrics"].as_array().unwrap().len(), 33);
        assert!(value["summary"]["potential_symptom_questions"].is_array());
        assert_eq!(value["metrics"][0]["status"], "IN_RANGE");
    }

    #[test]
    fn test_criterion_boundaries() {
        assert_eq!(Criterion::Between(1.8, 2.2).status(Some(2.2)), MetricStatus::InRange);
        assert_eq!(Criterion::Below(2.2).status(Some(2.2)), MetricStatus::OutOfRange);
        assert_eq!(Criterion::AtMost(15.0).status(Some(15.0)), MetricStatus::InRange);
        assert_eq!(Criterion::Above(9.5).status(Some(f64::NAN)), MetricStatus::Missing);
        assert_eq!(ratio(Some(1.0), Some(0.0)), None);
    }
}
