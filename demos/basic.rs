//! Basic walk through encoding, recall, working memory and consolidation

use engram::{
    CognitiveConfigBuilder, EncodeInput, Emotion, MemoryEngine, MemoryKind, RecallOptions,
};

#[tokio::main]
async fn main() -> engram::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Engram - Basic Example ===\n");

    let config = CognitiveConfigBuilder::new()
        .db_path("./data/basic_example/memory.db")
        .build();
    let engine = MemoryEngine::open(config).await?;

    println!("Encoding memories...");
    let inputs = [
        EncodeInput::new("Checkout errors after the friday deploy", MemoryKind::Episodic)
            .with_context("shop:payments")
            .with_emotion(Emotion::Anxiety),
        EncodeInput::new("Checkout errors traced to a stale feature flag", MemoryKind::Episodic)
            .with_context("shop:payments"),
        EncodeInput::new("Checkout errors gone after flag cleanup", MemoryKind::Episodic)
            .with_context("shop:payments")
            .with_emotion(Emotion::Satisfaction),
    ];
    for input in &inputs {
        let memory = engine.encode(input).await?;
        println!("  {} ({:.3})", memory.id, memory.activation);
    }
    engine
        .encode_procedural("Roll back with `deploy revert <sha>`", Some("shop"))
        .await?;

    println!("\nRecalling 'checkout'...");
    for (i, hit) in engine
        .recall("checkout", &RecallOptions::default().limit(5))
        .await?
        .iter()
        .enumerate()
    {
        println!(
            "  {}. {} (activation {:.3}, spreading {:.3}, latency {:.3}s)",
            i + 1,
            hit.memory.content,
            hit.activation,
            hit.spreading_activation,
            hit.latency
        );
    }

    let load = engine.recall_to_focus("flag").await?;
    println!(
        "\nWorking memory: {}/{} slots",
        load.utilization.used, load.utilization.capacity
    );

    let report = engine.consolidate().await?;
    println!(
        "\nConsolidation: {} strengthened, {} pruned, {} facts, {} associations",
        report.strengthened, report.pruned, report.facts_extracted, report.associations_discovered
    );
    for fact in &report.extracted_facts {
        println!("  {fact}");
    }

    let stats = engine.stats().await?;
    println!(
        "\n{} episodic, {} semantic, {} procedural, {} associations",
        stats.episodic, stats.semantic, stats.procedural, stats.associations
    );

    Ok(())
}
