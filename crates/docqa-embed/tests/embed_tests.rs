use std::path::Path;

use docqa_core::config::{EmbeddingSettings, RerankSettings};
use docqa_core::traits::Embedder;
use docqa_embed::{load_embedder, load_pair_scorer, HashEmbedder};

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(384);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    assert_eq!(embs[0].len(), 384);

    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in embs[0].iter().zip(embs[1].iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_tokens_score_higher() {
    let e = HashEmbedder::new(384);
    let q = e.embed("dental coverage").unwrap();
    let near = e.embed("The policy includes dental coverage for members").unwrap();
    let far = e.embed("Parking is available behind the building").unwrap();
    assert!(dot(&q, &near) > dot(&q, &far));
}

#[test]
fn punctuation_only_text_is_still_unit_length() {
    let v = HashEmbedder::new(16).embed("... !!").unwrap();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
}

#[test]
fn use_fake_setting_selects_hash_embedder() {
    let settings = EmbeddingSettings { use_fake: true, dimension: 32, ..EmbeddingSettings::default() };
    let embedder = load_embedder(&settings, Path::new(".")).expect("fake embedder");
    assert_eq!(embedder.dim(), 32);
}

#[test]
fn missing_cross_encoder_yields_none() {
    let settings = RerankSettings {
        cross_encoder_dir: Some("/definitely/not/here".into()),
        ..RerankSettings::default()
    };
    assert!(load_pair_scorer(&settings, Path::new(".")).is_none());
    let none = RerankSettings { cross_encoder_dir: None, ..RerankSettings::default() };
    assert!(load_pair_scorer(&none, Path::new(".")).is_none());
}
