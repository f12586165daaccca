// TestResultRecord - immutable outcome of a completed threshold or MCL test

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::traversal::Ear;

/// Which procedure produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    Threshold,
    Mcl,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Threshold => "Threshold",
            TestType::Mcl => "MCL",
        }
    }
}

/// Identifying fields captured when a test starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecordHeader {
    /// Millisecond timestamp, strictly increasing within the process
    pub test_id: u64,
    pub group: String,
    pub patient_name: String,
}

impl RecordHeader {
    /// Header stamped with the next test id
    pub fn now(group: impl Into<String>, patient_name: impl Into<String>) -> Self {
        Self {
            test_id: next_test_id(),
            group: group.into(),
            patient_name: patient_name.into(),
        }
    }
}

/// Last id handed out by [`next_test_id`]
static LAST_TEST_ID: AtomicU64 = AtomicU64::new(0);

/// Wall-clock milliseconds, bumped past the previous id when the clock has
/// not advanced (or stepped backwards)
pub fn next_test_id() -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let previous = LAST_TEST_ID
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now_ms.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now_ms.max(previous + 1)
}

/// Final level and full presentation history for one (frequency, ear) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyResult {
    pub frequency_hz: f32,
    pub ear: Ear,
    /// Threshold or MCL in dB HL
    pub final_level: f32,
    /// Every presented level followed by the final level
    pub level_history: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultRecord {
    pub header: RecordHeader,
    pub test_type: TestType,
    pub results: Vec<FrequencyResult>,
}

impl TestResultRecord {
    pub fn test_id(&self) -> u64 {
        self.header.test_id
    }

    pub fn result_for(&self, frequency_hz: f32, ear: Ear) -> Option<&FrequencyResult> {
        self.results
            .iter()
            .find(|r| r.ear == ear && (r.frequency_hz - frequency_hz).abs() < 0.5)
    }

    /// Flatten into the string-keyed layout used by simple preference stores
    ///
    /// Keys: `{id}_group_name`, `{id}_patient_name`, `{id}_test_type`,
    /// `{id}_{freq}_{ear}` (final level) and `{id}_{freq}_{ear}_history`.
    pub fn to_key_values(&self) -> BTreeMap<String, String> {
        let id = self.header.test_id;
        let mut map = BTreeMap::new();
        map.insert(format!("{id}_group_name"), self.header.group.clone());
        map.insert(format!("{id}_patient_name"), self.header.patient_name.clone());
        map.insert(format!("{id}_test_type"), self.test_type.as_str().to_string());

        for result in &self.results {
            let key = format!("{id}_{}_{}", result.frequency_hz, result.ear.label());
            map.insert(key.clone(), format_level(result.final_level));
            let history: Vec<String> = result.level_history.iter().map(|l| format_level(*l)).collect();
            map.insert(format!("{key}_history"), format!("[{}]", history.join(", ")));
        }
        map
    }
}

fn format_level(level: f32) -> String {
    if level.fract() == 0.0 {
        format!("{}", level as i64)
    } else {
        format!("{}", level)
    }
}
