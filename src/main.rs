//! coalition-flow CLI
//!
//! Negotiate and compare cooperation regimes from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Negotiate between the first two agents of an instance
//! coalition-flow negotiate --input instance.json
//!
//! # Reverse processing order, JSON output
//! coalition-flow negotiate --input instance.json --order 1,0 --format json
//!
//! # Compare every cooperation regime
//! coalition-flow compare --input instance.json
//!
//! # Generate a random instance
//! coalition-flow generate --agents 2 --vertices 4 --seed 7
//! ```

use coalition_flow::core::agent::AgentId;
use coalition_flow::core::instance::Instance;
use coalition_flow::negotiation::driver::{run_negotiation, NegotiationConfig};
use coalition_flow::negotiation::order::compare_orders;
use coalition_flow::optimization::surplus::compare_regimes;
use coalition_flow::simulation::instance_generator::{generate_random_instance, InstanceConfig};
use coalition_flow::solver::good_lp_backend::GoodLpSolver;
use std::fs;
use std::process;
use std::time::Duration;

fn print_usage() {
    eprintln!(
        r#"coalition-flow — cooperative multi-agent network-flow games

USAGE:
    coalition-flow <COMMAND> [OPTIONS]

COMMANDS:
    negotiate   Run the iterative best-response negotiation between two agents
    compare     Compare no, residual, partial, full and iterative cooperation
    generate    Generate a random instance (for testing)
    help        Show this message

OPTIONS (negotiate, compare):
    --input <FILE>        Path to JSON instance file
    --time-limit <SECS>   Wall-clock budget (default: 5400)
    --format <FORMAT>     Output format: text (default) or json

OPTIONS (negotiate):
    --order <A,B>         Processing order (default: first two agents)
    --max-rounds <N>      Round limit (default: 100)
    --both-orders         Also run the reverse order and compare

OPTIONS (generate):
    --agents <N>          Number of agents (default: 2)
    --vertices <N>        Number of vertices (default: 4)
    --seed <S>            Seed for reproducible instances
    --output <FILE>       Write to file instead of stdout

EXAMPLES:
    coalition-flow negotiate --input instance.json
    coalition-flow negotiate --input instance.json --order 1,0 --max-rounds 20
    coalition-flow compare --input instance.json --format json
    coalition-flow generate --agents 2 --vertices 3 --seed 42 --output instance.json"#
    );
}

/// JSON output schema for a negotiation.
#[derive(serde::Serialize)]
struct NegotiationOutput {
    converged: bool,
    order: Vec<u32>,
    rounds: usize,
    total_payoff: Option<String>,
    payoffs: Vec<PayoffOutput>,
    failure: Option<String>,
}

#[derive(serde::Serialize)]
struct PayoffOutput {
    agent: u32,
    payoff: String,
    out_payments: String,
    in_payments: String,
}

fn next_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    args.get(*i).map(String::as_str).unwrap_or_else(|| {
        eprintln!("{} requires {}", args[*i - 1], what);
        process::exit(1);
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("{} requires a number, got '{}'", flag, value);
        process::exit(1);
    })
}

fn load_instance(path: &str) -> Instance {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });
    Instance::from_json(&content).unwrap_or_else(|e| {
        eprintln!("Error loading instance: {}", e);
        eprintln!("Expected format:");
        eprintln!(
            r#"{{
  "vertices": [0, 1, 2, 3],
  "agents": [
    {{ "id": 0,
      "commodities": [{{ "origin": 0, "terminal": 1, "units": 4, "revenue": "2" }}],
      "edges": [{{ "head": 2, "tail": 3, "cost": "3", "capacity": 5 }}] }}
  ]
}}"#
        );
        process::exit(1);
    })
}

fn parse_order(value: &str) -> [AgentId; 2] {
    let ids: Vec<u32> = value
        .split(',')
        .map(|s| parse_number(s.trim(), "--order"))
        .collect();
    match ids.as_slice() {
        &[a, b] => [AgentId::new(a), AgentId::new(b)],
        _ => {
            eprintln!("--order requires exactly two agent ids, e.g. 0,1");
            process::exit(1);
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing output: {}", e);
        process::exit(1);
    })
}

fn cmd_negotiate(args: &[String]) {
    let mut input_path = None;
    let mut order = None;
    let mut config = NegotiationConfig::default();
    let mut format = "text".to_string();
    let mut both_orders = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => input_path = Some(next_value(args, &mut i, "a file path").to_string()),
            "--order" => order = Some(parse_order(next_value(args, &mut i, "two agent ids"))),
            "--max-rounds" => {
                let value = next_value(args, &mut i, "a number");
                config.max_rounds = parse_number(value, "--max-rounds");
            }
            "--time-limit" => {
                let secs: u64 = parse_number(next_value(args, &mut i, "seconds"), "--time-limit");
                config.time_limit = Duration::from_secs(secs);
            }
            "--format" => format = next_value(args, &mut i, "'text' or 'json'").to_string(),
            "--both-orders" => both_orders = true,
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });
    let instance = load_instance(&path);
    let order = order.unwrap_or_else(|| match instance.agent_ids().as_slice() {
        &[a, b, ..] => [a, b],
        _ => {
            eprintln!("Error: the instance needs at least two agents to negotiate");
            process::exit(1);
        }
    });
    let solver = GoodLpSolver::new();

    if both_orders {
        let comparison = compare_orders(&instance, order, &config, &solver);
        println!("{}", comparison);
        return;
    }

    let result = run_negotiation(&instance, order, config.max_rounds, config.time_limit, &solver);

    if format == "json" {
        let output = match &result {
            Ok(eq) => NegotiationOutput {
                converged: true,
                order: order.iter().map(|a| a.id()).collect(),
                rounds: eq.rounds,
                total_payoff: Some(eq.total_payoff.to_string()),
                payoffs: eq
                    .solutions
                    .iter()
                    .map(|(agent, s)| PayoffOutput {
                        agent: agent.id(),
                        payoff: s.payoff().to_string(),
                        out_payments: s.out_payments().to_string(),
                        in_payments: s.in_payments().to_string(),
                    })
                    .collect(),
                failure: None,
            },
            Err(failure) => NegotiationOutput {
                converged: false,
                order: order.iter().map(|a| a.id()).collect(),
                rounds: failure.rounds_used(),
                total_payoff: None,
                payoffs: Vec::new(),
                failure: Some(failure.to_string()),
            },
        };
        println!("{}", to_json(&output));
        return;
    }

    match result {
        Ok(eq) => {
            println!("=== Negotiation Equilibrium ===");
            println!("Session:      {}", eq.session_id);
            println!("Started:      {}", eq.started_at);
            println!("Order:        [{}, {}]", eq.order[0], eq.order[1]);
            println!("Rounds:       {}", eq.rounds);
            println!("Total payoff: {}", eq.total_payoff);
            for (agent, solution) in &eq.solutions {
                println!("  Agent {}: {}", agent, solution);
            }
        }
        Err(failure) => {
            eprintln!("Negotiation failed after {} rounds: {}", failure.rounds_used(), failure);
            process::exit(1);
        }
    }
}

fn cmd_compare(args: &[String]) {
    let mut input_path = None;
    let mut config = NegotiationConfig::default();
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => input_path = Some(next_value(args, &mut i, "a file path").to_string()),
            "--time-limit" => {
                let secs: u64 = parse_number(next_value(args, &mut i, "seconds"), "--time-limit");
                config.time_limit = Duration::from_secs(secs);
            }
            "--format" => format = next_value(args, &mut i, "'text' or 'json'").to_string(),
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });
    let instance = load_instance(&path);

    let comparison = compare_regimes(&instance, &GoodLpSolver::new(), &config).unwrap_or_else(|e| {
        eprintln!("Error comparing regimes: {}", e);
        process::exit(1);
    });

    if format == "json" {
        println!("{}", to_json(&comparison));
    } else {
        println!("{}", comparison);
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = InstanceConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--agents" => {
                config.agents = parse_number(next_value(args, &mut i, "a number"), "--agents")
            }
            "--vertices" => {
                config.vertices = parse_number(next_value(args, &mut i, "a number"), "--vertices")
            }
            "--seed" => {
                config.seed = Some(parse_number(next_value(args, &mut i, "a number"), "--seed"))
            }
            "--output" => output_path = Some(next_value(args, &mut i, "a file path").to_string()),
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let instance = generate_random_instance(&config);
    let json = instance.to_json().unwrap_or_else(|e| {
        eprintln!("Error serializing instance: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} agents over {} vertices → {}",
            config.agents, config.vertices, path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "negotiate" => cmd_negotiate(rest),
        "compare" => cmd_compare(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
