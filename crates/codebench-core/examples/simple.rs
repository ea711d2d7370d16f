use std::sync::Arc;

use codebench_core::testing::ScriptedProvider;
use codebench_core::{
    from_async_fn, metrics, EvaluationRequest, Generation, HttpProvider, Orchestrator,
};
use futures::StreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: Two local providers, one answering in a single piece
    let echo = from_async_fn(|request| async move {
        let name = request.model.replace('-', "_");
        Ok(Generation::Complete(format!(
            "def {name}(items):\n    \"\"\"Return the items in ascending order.\"\"\"\n    return sorted(items)\n"
        )))
    });

    // and one streaming its answer in fragments, once per batch below
    let bubble = [
        "def bubble(items):\n",
        "    for i in range(len(items)):\n",
        "        for j in range(len(items) - i - 1):\n",
        "            if items[j] > items[j + 1]:\n",
        "                items[j], items[j + 1] = items[j + 1], items[j]\n",
        "    return items\n",
    ];
    let streaming = ScriptedProvider::new().stream(bubble).stream(bubble);

    let orchestrator = Orchestrator::builder()
        .provider("sorted-builtin", echo)
        .provider("bubble-sort", Arc::new(streaming))
        .build()?;

    let request = EvaluationRequest::new("Write a function that sorts a list", ["sorted-builtin", "bubble-sort"])
        .with_priority([metrics::TIME_COMPLEXITY, metrics::READABILITY]);

    let mut signals = orchestrator.run(request.clone())?;
    while let Some(signal) = signals.next().await {
        println!("{}", serde_json::to_string(&signal)?);
    }

    // Example 2: The same batch folded into a report
    let report = orchestrator.evaluate(request).await?;
    println!("{}", report.ranking_table());

    // Example 3: A real endpoint, if one is given
    if let Some(url) = std::env::args().nth(1) {
        let orchestrator = Orchestrator::builder()
            .provider("remote", Arc::new(HttpProvider::new(url)))
            .build()?;
        let report = orchestrator
            .evaluate(EvaluationRequest::new("Write a function that sorts a list", ["remote"]))
            .await?;
        println!("{}", report.ranking_table());
    }

    Ok(())
}
