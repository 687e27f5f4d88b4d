use ai_detector_lib::services::config_store::ConfigStore;
use ai_detector_lib::services::detection::Detector;
use ai_detector_lib::services::model::{load_into, ModelSlot};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let store = ConfigStore::from_env();
    let config = store.load_effective()?;

    if has_flag(&args, "--print-config") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let text = match parse_arg_value(&args, "--file") {
        Some(path) => std::fs::read_to_string(&path).with_context(|| format!("read {}", path))?,
        None => match args.get(1) {
            Some(t) if !t.starts_with("--") => t.clone(),
            _ => {
                eprintln!(
                    "Usage:\n  detect_text <text>\n  detect_text --file <path>\n  detect_text --print-config\n\nNotes:\n  - Model and cache dir come from the service config (DETECTOR_CONFIG, MODEL_NAME, MODEL_CACHE_DIR)."
                );
                return Ok(());
            }
        },
    };

    eprintln!("Model: {}", config.model.name);
    eprintln!("Input: {} chars  {}", text.chars().count(), preview(&text, 80));

    let t0 = Instant::now();
    let slot = Arc::new(ModelSlot::new());
    load_into(&config.model, &slot).await.context("loading model")?;
    eprintln!("Loaded in {} ms", t0.elapsed().as_millis());

    let response = Detector::new(slot).detect(text).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
