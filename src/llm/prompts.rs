//! Prompt builders for ranking and metadata extraction

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::StaticConfig;
use crate::forecast::ForecastBundle;
use crate::metadata::{Priority, ResolvedMetadata};
use crate::selection::RegionMetrics;

/// Human-readable 24-hour forecast table, one block per region.
pub fn format_forecast_table(bundle: &ForecastBundle) -> String {
    let start = bundle
        .start_time()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();

    let mut out = format!(
        "Carbon Intensity Forecast (gCO2eq/kWh) for next 24 hours starting {}:\n\n",
        start
    );

    for (region_code, region) in &bundle.regions {
        let _ = writeln!(out, "{} ({}):", region_code, region.name);
        for point in region.forecast.iter().take(24) {
            let _ = writeln!(
                out,
                "  {} - {} gCO2eq/kWh",
                point.datetime.format("%Y-%m-%d %H:%M"),
                point.carbon_intensity
            );
        }
        out.push('\n');
    }

    out
}

/// Candidate-region comparison: per-execution and yearly cost and
/// emissions, plus the average grid intensity.
pub fn format_region_comparison(
    metadata: &ResolvedMetadata,
    metrics: &BTreeMap<String, RegionMetrics>,
    config: &StaticConfig,
) -> String {
    let total_data_gb = metadata.data_input_gb + metadata.data_output_gb;
    let yearly_invocations = metadata.invocations_per_day * 365;

    let mut out = String::from("\nFunction Execution Profile:\n");
    let _ = writeln!(
        out,
        "- Data transfer per execution: {:.2} GB ({:.2} GB input + {:.2} GB output)",
        total_data_gb, metadata.data_input_gb, metadata.data_output_gb
    );
    let _ = writeln!(out, "- Invocations per day: {}", metadata.invocations_per_day);
    let _ = writeln!(out, "- Data source location: {}", metadata.source_location);
    let _ = writeln!(
        out,
        "- Note: Executing in {} has ZERO transfer cost",
        metadata.source_location
    );

    let _ = writeln!(
        out,
        "\nREGION COMPARISON - Yearly Costs and Emissions ({} executions/year)\n",
        yearly_invocations
    );

    // Cheapest transfer first so the model reads the baseline early.
    let mut sorted: Vec<_> = metrics.iter().collect();
    sorted.sort_by(|a, b| {
        a.1.transfer_cost_yearly
            .partial_cmp(&b.1.transfer_cost_yearly)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (region_code, m) in sorted {
        let region_name = config
            .regions
            .get(region_code.as_str())
            .map(|r| r.name.as_str())
            .unwrap_or(region_code.as_str());
        let _ = writeln!(out, "{} ({}):", region_code, region_name);
        let _ = writeln!(
            out,
            "  Transfer Cost: ${:.4}/exec -> ${:.0}/year",
            m.transfer_cost_per_execution, m.transfer_cost_yearly
        );
        let _ = writeln!(
            out,
            "  Compute Cost: ${:.6}/exec",
            m.compute_cost_per_execution
        );
        let _ = writeln!(
            out,
            "  CO2 Emissions: {:.2}g/exec -> {:.1}kg/year",
            m.emissions_per_execution_g, m.emissions_yearly_kg
        );
        let _ = writeln!(
            out,
            "  Avg Carbon Intensity: {:.0} gCO2/kWh\n",
            m.avg_carbon_intensity
        );
    }

    out
}

fn decision_framework(priority: Priority) -> &'static str {
    match priority {
        Priority::Costs => {
            "DECISION FRAMEWORK - COST OPTIMIZATION PRIORITY:\n\
             \n\
             Your PRIMARY goal is cost minimization. Carbon emissions are SECONDARY.\n\
             \n\
             1. PARETO OPTIMALITY: if a region is both cheaper AND cleaner, always choose it.\n\
             2. COST-FIRST MINDSET: any non-trivial cost increase requires strong justification.\n\
                Example: $100/year at 200kg CO2 beats $200/year at 150kg CO2 under this priority.\n\
                Counterexample: a 5% cost increase for a 95% emissions reduction IS justified;\n\
                an extreme emissions difference is too large to ignore.\n\
             3. WHEN TO CONSIDER EMISSIONS: only when the cost difference is negligible in\n\
                absolute terms, or the emissions difference is extreme. Judge both from the\n\
                actual numbers, not fixed thresholds.\n\
             \n\
             Your reasoning MUST explain why the cost savings justify the emissions accepted."
        }
        Priority::Emissions => {
            "DECISION FRAMEWORK - EMISSIONS OPTIMIZATION PRIORITY:\n\
             \n\
             Your PRIMARY goal is carbon emissions minimization. Cost is SECONDARY.\n\
             \n\
             1. PARETO OPTIMALITY: if a region is both cheaper AND cleaner, always choose it.\n\
             2. EMISSIONS-FIRST MINDSET: any non-trivial emissions increase requires strong\n\
                justification. Example: $500/year at 50kg CO2 beats $250/year at 75kg CO2\n\
                under this priority.\n\
                Counterexample: 90% cost savings for 2% more emissions IS justified; an\n\
                extreme cost difference is too large to ignore.\n\
             3. WHEN TO CONSIDER COSTS: only when the emissions difference is negligible in\n\
                absolute terms, or the cost difference is extreme. Judge both from the actual\n\
                numbers, not fixed thresholds.\n\
             \n\
             Your reasoning MUST explain why the emissions reduction justifies the cost accepted."
        }
        Priority::Balanced => {
            "DECISION FRAMEWORK - BALANCED OPTIMIZATION:\n\
             \n\
             Your goal is the best tradeoff between cost and carbon emissions.\n\
             \n\
             1. PARETO OPTIMALITY: if a region is both cheaper AND cleaner, always choose it.\n\
             2. COST-EFFECTIVENESS OF CARBON REDUCTION: compute\n\
                (extra cost per year) / (kg CO2 saved per year) = cost per kg CO2 avoided,\n\
                and judge whether that price is good value.\n\
             3. ABSOLUTE MAGNITUDE MATTERS: tiny absolute differences are not worth\n\
                optimizing; large ones deserve careful cost-effectiveness analysis.\n\
             4. NO FIXED THRESHOLDS: balance relative percentages against absolute magnitudes.\n\
             \n\
             Your reasoning MUST include the cost-per-kg calculation when a tradeoff exists."
        }
    }
}

/// Build the full ranking prompt for one function.
pub fn ranking_prompt(
    metadata: &ResolvedMetadata,
    bundle: &ForecastBundle,
    metrics: &BTreeMap<String, RegionMetrics>,
    config: &StaticConfig,
) -> String {
    let priority = metadata.priority;
    let forecast_table = format_forecast_table(bundle);
    let comparison = format_region_comparison(metadata, metrics, config);

    let latency_context = if metadata.latency_important {
        let continent = config.continent_of(&metadata.source_location);
        format!(
            "\nLATENCY REQUIREMENT: This function is latency-sensitive. Only {} regions \
             are included to minimize cross-continent latency. All scheduling decisions \
             must respect the low-latency requirement.\n",
            continent
        )
    } else {
        String::new()
    };

    format!(
        "You are a carbon-aware serverless function scheduler. Your goal is to optimize \
         execution scheduling based on the specified priority level.\n\
         \n\
         Function Details:\n\
         - Function ID: {id}\n\
         - Runtime: {runtime} ms\n\
         - Memory: {memory} MB\n\
         - vCPUs: {vcpus}\n\
         - GPU required: {gpu}\n\
         - Description: {description}\n\
         - Optimization Priority: {priority_upper}\n\
         \n\
         {comparison}{latency_context}\n\
         {forecast_table}\n\
         {framework}\n\
         \n\
         Task:\n\
         Create a scheduling recommendation for each of the next 24 time slots. For each \
         time slot, recommend the BEST region to execute this function.\n\
         \n\
         Output Format (JSON only, no markdown):\n\
         {{\n\
           \"recommendations\": [\n\
             {{\n\
               \"datetime\": \"2025-01-17 10:00\",\n\
               \"region\": \"europe-north1\",\n\
               \"carbon_intensity\": 45,\n\
               \"transfer_cost_usd\": <USE EXACT VALUE FROM REGION COMPARISON ABOVE>,\n\
               \"emissions_grams\": <USE EXACT VALUE FROM REGION COMPARISON ABOVE>,\n\
               \"priority\": 1,\n\
               \"reasoning\": \"Quantified tradeoff: cost difference in $/year, emissions \
         difference in kg/year, cost per kg CO2 avoided when relevant, and the decision \
         under the {priority} priority.\"\n\
             }}\n\
           ]\n\
         }}\n\
         \n\
         CRITICAL REQUIREMENTS:\n\
         - Use datetime format \"YYYY-MM-DD HH:MM\" in UTC, converted from the forecast \
         timestamps.\n\
         - Use platform region codes (europe-west1, europe-north1, ...) NOT grid zone codes.\n\
         - Provide EXACTLY 24 recommendations, one for each hour in the forecast.\n\
         - Sort recommendations ASCENDING by the priority field (1 = BEST, 24 = WORST); the \
         priorities must be exactly the numbers 1 through 24.\n\
         - For transfer_cost_usd and emissions_grams: copy the EXACT per-execution values \
         from the REGION COMPARISON section; do not recompute them.\n\
         - Include a detailed reasoning field for EACH recommendation with specific, \
         quantified tradeoff analysis (vague statements like \"good balance of cost and \
         emissions\" are not acceptable).\n\
         - Return ONLY valid JSON, no additional text or markdown formatting.",
        id = metadata.function_id,
        runtime = metadata.runtime_ms,
        memory = metadata.memory_mb,
        vcpus = metadata.vcpus,
        gpu = metadata.gpu_required,
        description = metadata.description,
        priority_upper = priority.as_str().to_uppercase(),
        comparison = comparison,
        latency_context = latency_context,
        forecast_table = forecast_table,
        framework = decision_framework(priority),
        priority = priority.as_str(),
    )
}

/// Build the natural-language metadata extraction prompt.
pub fn extraction_prompt(description: &str) -> String {
    format!(
        "You are a serverless infrastructure expert. Convert this natural language function \
         description into structured metadata for carbon-aware scheduling.\n\
         \n\
         User's description:\n\
         \"\"\"{description}\"\"\"\n\
         \n\
         Extract and estimate these parameters:\n\
         1. function_id: descriptive ID (snake_case, lowercase, no spaces)\n\
         2. runtime_ms: estimated execution time in milliseconds\n\
            - Simple API calls: 50-200ms\n\
            - Image processing: 500-2000ms\n\
            - Video processing: 30,000-300,000ms\n\
            - ML inference: 1,000-10,000ms\n\
            - Data transformations: 100-5,000ms\n\
         3. memory_mb: memory requirement, chosen from: 128, 256, 512, 1024, 2048, 4096\n\
         4. description: clean one-sentence technical summary\n\
         5. data_input_gb / data_output_gb: data size per invocation, in GB\n\
         6. source_location: region code if mentioned, default \"us-east1\"\n\
         7. invocations_per_day: stated frequency or an estimate from the use case\n\
         8. priority: \"balanced\" (default), \"costs\" (cost-sensitive wording) or \
         \"emissions\" (green/sustainable wording)\n\
         9. latency_important: true when low latency / real-time response is called for\n\
         10. gpu_required: true when GPU acceleration is needed (ML, AI inference, training)\n\
         11. vcpus: integer 1-8, only when different from the defaults (1 without GPU, 8 with)\n\
         12. allowed_regions: region codes if mentioned, otherwise []\n\
         \n\
         IMPORTANT estimation guidelines:\n\
         - Be conservative: overestimate resource needs for safety.\n\
         - If runtime is uncertain, multiply your estimate by 2x.\n\
         - For memory, always round UP to the next tier.\n\
         - Include ALL data transfer (downloads AND uploads).\n\
         - Consider peak loads, not just average usage.\n\
         \n\
         Return ONLY valid JSON matching this exact schema (no markdown, no explanations):\n\
         {{\n\
           \"function_id\": \"string\",\n\
           \"runtime_ms\": number,\n\
           \"memory_mb\": number,\n\
           \"description\": \"string\",\n\
           \"data_input_gb\": number,\n\
           \"data_output_gb\": number,\n\
           \"source_location\": \"string\",\n\
           \"invocations_per_day\": number,\n\
           \"priority\": \"balanced|costs|emissions\",\n\
           \"latency_important\": boolean,\n\
           \"gpu_required\": boolean,\n\
           \"vcpus\": number,\n\
           \"allowed_regions\": [\"array of region codes or empty\"],\n\
           \"confidence_score\": number,\n\
           \"assumptions\": [\"key assumptions made during estimation\"],\n\
           \"warnings\": [\"potential concerns or uncertainties\"]\n\
         }}",
        description = description
    )
}
