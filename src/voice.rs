//! Voice style tables and weighted voice blending.
//!
//! A voice is stored as a flat `f32` buffer of `N × D` values.  Row `i` is the
//! style vector for a chunk of `i + 1` tokens.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, SynthError},
    npz::load_npz,
};

// ─────────────────────────────────────────────────────────────────────────────
// Style table
// ─────────────────────────────────────────────────────────────────────────────

/// Length-indexed style vectors of one voice (or of a blend of voices).
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    dim: usize,
    data: Vec<f32>, // flat, row-major
}

impl StyleTable {
    /// Reshape a flat buffer into rows of `dim` values.
    pub fn from_flat(data: Vec<f32>, dim: usize) -> anyhow::Result<Self> {
        if dim == 0 {
            bail!("style dimension must be positive");
        }
        if data.is_empty() || data.len() % dim != 0 {
            bail!(
                "voice buffer of {} values is not a whole number of {}-wide style vectors",
                data.len(),
                dim
            );
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Largest chunk token length this table has a vector for.
    pub fn domain(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Style vector for a chunk of `token_len` tokens (1-based).
    pub fn vector_for_len(&self, token_len: usize) -> Option<&[f32]> {
        if token_len == 0 || token_len > self.domain() {
            return None;
        }
        let i = token_len - 1;
        Some(&self.data[i * self.dim..(i + 1) * self.dim])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice sources
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves a voice identifier to its raw style buffer.
pub trait VoiceSource: Send + Sync {
    fn contains(&self, voice_id: &str) -> bool;

    fn load(&self, voice_id: &str) -> anyhow::Result<Vec<f32>>;

    /// Known voice identifiers, sorted.
    fn voice_ids(&self) -> Vec<String>;
}

/// Voices held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVoiceSource {
    voices: HashMap<String, Vec<f32>>,
}

impl InMemoryVoiceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>, data: Vec<f32>) -> Self {
        self.voices.insert(voice_id.into(), data);
        self
    }
}

impl VoiceSource for InMemoryVoiceSource {
    fn contains(&self, voice_id: &str) -> bool {
        self.voices.contains_key(voice_id)
    }

    fn load(&self, voice_id: &str) -> anyhow::Result<Vec<f32>> {
        self.voices
            .get(voice_id)
            .cloned()
            .with_context(|| format!("Voice '{}' not found", voice_id))
    }

    fn voice_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.voices.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// A directory of `<voice_id>.bin` files holding raw little-endian `f32`.
#[derive(Debug, Clone)]
pub struct DirVoiceSource {
    dir: PathBuf,
}

impl DirVoiceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, voice_id: &str) -> Option<PathBuf> {
        let safe = !voice_id.is_empty()
            && voice_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        safe.then(|| self.dir.join(format!("{voice_id}.bin")))
    }
}

impl VoiceSource for DirVoiceSource {
    fn contains(&self, voice_id: &str) -> bool {
        self.path_for(voice_id).is_some_and(|p| p.is_file())
    }

    fn load(&self, voice_id: &str) -> anyhow::Result<Vec<f32>> {
        let path = self
            .path_for(voice_id)
            .with_context(|| format!("Invalid voice id '{}'", voice_id))?;
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Cannot read voice file: {}", path.display()))?;
        if bytes.len() % 4 != 0 {
            bail!("Voice file {} is not a whole number of f32 values", path.display());
        }
        debug!(voice_id, path = %path.display(), "loaded voice file");
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn voice_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        ids
    }
}

/// All voices from a NumPy `.npz` archive, one float32 array per voice.
pub struct NpzVoiceSource {
    voices: InMemoryVoiceSource,
}

impl NpzVoiceSource {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let arrays = load_npz(path)
            .with_context(|| format!("Cannot load voices: {}", path.display()))?;
        debug!(count = arrays.len(), path = %path.display(), "loaded voice archive");
        let voices = arrays
            .into_iter()
            .fold(InMemoryVoiceSource::new(), |acc, (name, arr)| acc.with_voice(name, arr.data));
        Ok(Self { voices })
    }
}

impl VoiceSource for NpzVoiceSource {
    fn contains(&self, voice_id: &str) -> bool {
        self.voices.contains(voice_id)
    }

    fn load(&self, voice_id: &str) -> anyhow::Result<Vec<f32>> {
        self.voices.load(voice_id)
    }

    fn voice_ids(&self) -> Vec<String> {
        self.voices.voice_ids()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Combiner
// ─────────────────────────────────────────────────────────────────────────────

/// One voice and its share in a blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceWeight {
    pub voice_id: String,
    pub weight: f32,
}

impl VoiceWeight {
    pub fn new(voice_id: impl Into<String>, weight: f32) -> Self {
        Self { voice_id: voice_id.into(), weight }
    }
}

/// Check that a weight list is usable for blending.
pub fn validate_weights(weights: &[VoiceWeight]) -> Result<()> {
    if weights.is_empty() {
        return Err(SynthError::InvalidWeight("at least one voice is required".into()));
    }
    for w in weights {
        if !w.weight.is_finite() || !(0.0..=1.0).contains(&w.weight) {
            return Err(SynthError::InvalidWeight(format!(
                "weight {} for voice '{}' is outside [0, 1]",
                w.weight, w.voice_id
            )));
        }
    }
    if weights.iter().all(|w| w.weight == 0.0) {
        return Err(SynthError::InvalidWeight("all voice weights are zero".into()));
    }
    Ok(())
}

/// Blend the named voices into one style table.
///
/// Each row is `Σ wᵥ·rowᵥ / Σ wᵥ`.  The result only covers the lengths every
/// input covers.  Zero-weight voices are ignored, and a single remaining
/// voice is returned as-is.
pub fn combine(weights: &[VoiceWeight], source: &dyn VoiceSource, dim: usize) -> Result<StyleTable> {
    validate_weights(weights)?;

    let mut active: Vec<&VoiceWeight> = weights.iter().filter(|w| w.weight > 0.0).collect();
    // Sum in a fixed order so the blend does not depend on request ordering.
    active.sort_by(|a, b| a.voice_id.cmp(&b.voice_id).then(a.weight.total_cmp(&b.weight)));

    let mut tables = Vec::with_capacity(active.len());
    for w in &active {
        if !source.contains(&w.voice_id) {
            return Err(SynthError::Validation(format!("unknown voice '{}'", w.voice_id)));
        }
        let raw = source.load(&w.voice_id).map_err(SynthError::UpstreamUnavailable)?;
        let table = StyleTable::from_flat(raw, dim)
            .with_context(|| format!("Malformed style data for voice '{}'", w.voice_id))
            .map_err(SynthError::UpstreamUnavailable)?;
        tables.push((w.weight, table));
    }

    if tables.len() == 1 {
        let (_, table) = tables.remove(0);
        return Ok(table);
    }

    let domain = tables.iter().map(|(_, t)| t.domain()).min().unwrap_or(0);
    let total: f32 = tables.iter().map(|(w, _)| *w).sum();
    let len = domain * dim;

    let mut blended = vec![0.0f32; len];
    for (weight, table) in &tables {
        for (acc, v) in blended.iter_mut().zip(&table.data[..len]) {
            *acc += weight * v;
        }
    }
    for v in &mut blended {
        *v /= total;
    }

    debug!(voices = tables.len(), domain, "combined voice styles");
    StyleTable::from_flat(blended, dim).map_err(SynthError::UpstreamUnavailable)
}

// ─────────────────────────────────────────────────────────────────────────────
// Weight adjustment
// ─────────────────────────────────────────────────────────────────────────────

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// Set one voice's weight and rebalance the others so the total stays ≤ 1.
///
/// The excess is taken from the other active voices in proportion to their
/// weight.  If no other voice is active the changed voice is set to 1.
pub fn adjust_voice_weights(
    selections: &BTreeMap<String, f32>,
    changed_voice_id: &str,
    new_weight: f32,
) -> BTreeMap<String, f32> {
    let mut updated = selections.clone();
    updated.insert(changed_voice_id.to_string(), round2(new_weight));

    let total: f32 = updated.values().sum();
    if total <= 1.0 {
        return updated;
    }

    let excess = total - 1.0;
    let others: Vec<String> = updated
        .iter()
        .filter(|(k, w)| k.as_str() != changed_voice_id && **w > 0.0)
        .map(|(k, _)| k.clone())
        .collect();
    let others_total: f32 = others.iter().map(|k| updated[k]).sum();

    if others_total == 0.0 {
        updated.insert(changed_voice_id.to_string(), 1.0);
        return updated;
    }

    for key in others {
        let w = updated[&key];
        let reduction = (w / others_total) * excess;
        updated.insert(key, round2((w - reduction).max(0.0)));
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: usize = 4;

    fn ramp(rows: usize, base: f32) -> Vec<f32> {
        (0..rows * DIM).map(|i| base + i as f32).collect()
    }

    fn source() -> InMemoryVoiceSource {
        InMemoryVoiceSource::new()
            .with_voice("af_heart", ramp(5, 0.0))
            .with_voice("am_adam", ramp(5, 100.0))
            .with_voice("bf_short", ramp(3, 10.0))
    }

    #[test]
    fn test_style_table_indexing() {
        let t = StyleTable::from_flat(ramp(3, 0.0), DIM).unwrap();
        assert_eq!(t.domain(), 3);
        assert_eq!(t.vector_for_len(1).unwrap(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(t.vector_for_len(3).unwrap(), &[8.0, 9.0, 10.0, 11.0]);
        assert!(t.vector_for_len(0).is_none());
        assert!(t.vector_for_len(4).is_none());
    }

    #[test]
    fn test_from_flat_rejects_ragged_buffer() {
        assert!(StyleTable::from_flat(vec![0.0; 7], DIM).is_err());
        assert!(StyleTable::from_flat(Vec::new(), DIM).is_err());
    }

    #[test]
    fn test_single_voice_weight_normalizes_away() {
        let src = source();
        let partial = combine(&[VoiceWeight::new("af_heart", 0.3)], &src, DIM).unwrap();
        let full = combine(&[VoiceWeight::new("af_heart", 1.0)], &src, DIM).unwrap();
        assert_eq!(partial, full);
    }

    #[test]
    fn test_weighted_blend() {
        let src = source();
        let t = combine(
            &[VoiceWeight::new("af_heart", 0.25), VoiceWeight::new("am_adam", 0.75)],
            &src,
            DIM,
        )
        .unwrap();
        // Row 0: 0.25*[0,1,2,3] + 0.75*[100,101,102,103]
        assert_eq!(t.vector_for_len(1).unwrap(), &[75.0, 76.0, 77.0, 78.0]);
    }

    #[test]
    fn test_blend_is_order_independent() {
        let src = source();
        let a = combine(
            &[VoiceWeight::new("af_heart", 0.3), VoiceWeight::new("am_adam", 0.6)],
            &src,
            DIM,
        )
        .unwrap();
        let b = combine(
            &[VoiceWeight::new("am_adam", 0.6), VoiceWeight::new("af_heart", 0.3)],
            &src,
            DIM,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_domain_clamps_to_shortest() {
        let src = source();
        let t = combine(
            &[VoiceWeight::new("af_heart", 0.5), VoiceWeight::new("bf_short", 0.5)],
            &src,
            DIM,
        )
        .unwrap();
        assert_eq!(t.domain(), 3);
    }

    #[test]
    fn test_invalid_weights() {
        let src = source();
        assert!(matches!(combine(&[], &src, DIM), Err(SynthError::InvalidWeight(_))));
        assert!(matches!(
            combine(&[VoiceWeight::new("af_heart", -0.1)], &src, DIM),
            Err(SynthError::InvalidWeight(_))
        ));
        assert!(matches!(
            combine(&[VoiceWeight::new("af_heart", 0.0)], &src, DIM),
            Err(SynthError::InvalidWeight(_))
        ));
    }

    #[test]
    fn test_unknown_voice() {
        let src = source();
        assert!(matches!(
            combine(&[VoiceWeight::new("zz_nobody", 1.0)], &src, DIM),
            Err(SynthError::Validation(_))
        ));
    }

    #[test]
    fn test_dir_source_rejects_path_ids() {
        let src = DirVoiceSource::new("/nonexistent");
        assert!(!src.contains("../etc/passwd"));
        assert!(src.load("a/b").is_err());
    }

    #[test]
    fn test_adjust_weights_within_budget() {
        let sel = BTreeMap::from([("a".to_string(), 0.2), ("b".to_string(), 0.3)]);
        let out = adjust_voice_weights(&sel, "a", 0.5);
        assert_eq!(out["a"], 0.5);
        assert_eq!(out["b"], 0.3);
    }

    #[test]
    fn test_adjust_weights_rebalances_others() {
        let sel = BTreeMap::from([
            ("a".to_string(), 0.5),
            ("b".to_string(), 0.25),
            ("c".to_string(), 0.25),
        ]);
        let out = adjust_voice_weights(&sel, "a", 0.8);
        assert_eq!(out["a"], 0.8);
        assert_eq!(out["b"], 0.1);
        assert_eq!(out["c"], 0.1);
    }

    #[test]
    fn test_adjust_weights_sole_voice_forced_to_one() {
        let sel = BTreeMap::from([("a".to_string(), 0.0), ("b".to_string(), 0.0)]);
        let out = adjust_voice_weights(&sel, "a", 1.4);
        assert_eq!(out["a"], 1.0);
        assert_eq!(out["b"], 0.0);
    }
}
