use std::fs;
use std::thread;
use std::time::Duration;

use blackjack_sim::{
    BetRamp, GameRules, PayoutRatio, RampStep, RunStatus, Runs, Settings, SimulationRequest,
    SimulationResult, WongOutPolicy,
};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "simulate",
    about = "Run a blackjack card-counting shoe simulation"
)]
struct Args {
    /// Full request as JSON (rules, deviations, bet_ramp, settings). When
    /// given, every other flag below is ignored.
    #[arg(long)]
    request: Option<String>,

    /// Use a preset: default, european, atlantic_city, single_deck
    #[arg(long)]
    preset: Option<String>,

    /// Number of decks, 1..=8
    #[arg(long, default_value = "6")]
    decks: u8,

    /// Dealer hits soft 17
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    hit_soft_17: bool,

    /// Dealer peeks under ten/ace for blackjack
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    dealer_peeks: bool,

    /// Allow surrender
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    surrender: bool,

    /// Blackjack payout ratio, e.g. "3:2", "6:5"
    #[arg(long, default_value = "3:2")]
    blackjack_payout: String,

    /// Flat bet size in units (ignored if --request is given)
    #[arg(long, default_value = "1")]
    flat_bet_units: u32,

    /// Number of rounds to simulate
    #[arg(long, default_value = "1000000")]
    hands: u64,

    /// RNG seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Bankroll in units, for risk-of-ruin/N0 figures
    #[arg(long)]
    bankroll: Option<f64>,

    /// Hands per hour, for hours-played figures
    #[arg(long)]
    hands_per_hour: Option<f64>,

    /// Worker thread count; 1 disables multiprocessing
    #[arg(long, default_value = "1")]
    workers: u64,

    /// Print the result as JSON instead of a text summary
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn parse_payout(s: &str) -> PayoutRatio {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        eprintln!("Invalid payout ratio '{s}', expected N:D (e.g. 3:2)");
        std::process::exit(1);
    }
    let num: u16 = parts[0].parse().unwrap_or_else(|_| {
        eprintln!("Invalid numerator in payout ratio '{s}'");
        std::process::exit(1);
    });
    let den: u16 = parts[1].parse().unwrap_or_else(|_| {
        eprintln!("Invalid denominator in payout ratio '{s}'");
        std::process::exit(1);
    });
    PayoutRatio::new(num, den).unwrap_or_else(|e| {
        eprintln!("Invalid payout ratio: {e}");
        std::process::exit(1);
    })
}

fn build_request(args: &Args) -> SimulationRequest {
    let rules = if let Some(preset) = &args.preset {
        match preset.as_str() {
            "default" => GameRules::default(),
            "european" => GameRules::european(),
            "atlantic_city" => GameRules::atlantic_city(),
            "single_deck" => GameRules::single_deck(),
            _ => {
                eprintln!(
                    "Unknown preset '{preset}'. Available: default, european, atlantic_city, single_deck"
                );
                std::process::exit(1);
            }
        }
    } else {
        GameRules {
            decks: args.decks,
            hit_soft_17: args.hit_soft_17,
            dealer_peeks: args.dealer_peeks,
            surrender: args.surrender,
            blackjack_payout: parse_payout(&args.blackjack_payout),
            ..GameRules::default()
        }
    };

    SimulationRequest {
        rules,
        counting_system: blackjack_sim::CountingSystem::default(),
        deviations: vec![],
        bet_ramp: BetRamp {
            steps: vec![RampStep {
                tc_floor: -100,
                units: args.flat_bet_units,
            }],
            wong_out_below_tc: None,
            wong_out_policy: WongOutPolicy::Anytime,
        },
        settings: Settings {
            hands: args.hands,
            seed: args.seed,
            unit_size: 1.0,
            bankroll: args.bankroll,
            hands_per_hour: args.hands_per_hour,
            deck_estimation_step: blackjack_sim::TcStep::HalfDeck,
            deck_estimation_rounding: blackjack_sim::RoundingMode::Nearest,
            use_estimated_tc_for_bet: false,
            use_estimated_tc_for_deviations: false,
            use_multiprocessing: args.workers > 1,
            worker_count: args.workers,
        },
    }
}

fn print_summary(result: &SimulationResult) {
    println!("Rounds played:       {}", result.rounds_played);
    println!("EV / 100 rounds:     {:+.4} units", result.ev_per_100);
    println!("SD / 100 rounds:     {:.4} units", result.stdev_per_100);
    println!("Avg initial bet:     {:.4} units", result.avg_initial_bet);
    println!("Desirability index:  {:.4}", result.di);
    println!("Score:               {:.4}", result.score);
    if let Some(n0) = result.n0_hands {
        println!("N0 (hands):          {:.0}", n0);
    }
    if let Some(hours) = result.hours_played {
        println!("Hours played:        {:.2}", hours);
    }
    if let Some(ror) = result.ror {
        println!("Risk of ruin:        {:.4}%", ror * 100.0);
    }
    if result.meta.was_cancelled {
        println!("(run was cancelled before reaching the requested round count)");
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let request = if let Some(path) = &args.request {
        let text = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Failed to read request file '{path}': {e}");
            std::process::exit(1);
        });
        serde_json::from_str(&text).unwrap_or_else(|e| {
            eprintln!("Failed to parse request JSON: {e}");
            std::process::exit(1);
        })
    } else {
        build_request(&args)
    };

    if let Err(e) = request.validate() {
        eprintln!("Invalid request: {e}");
        std::process::exit(1);
    }

    let runs = Runs::new();
    let handle = runs.start(request).unwrap_or_else(|e| {
        eprintln!("Failed to start run: {e}");
        std::process::exit(1);
    });

    loop {
        if let Some(result) = runs.get(handle).unwrap_or_else(|e| {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }) {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
            } else {
                print_summary(&result);
            }
            break;
        }

        let status = runs.status(handle).unwrap();
        if status.status == RunStatus::Error {
            eprintln!("Run failed");
            std::process::exit(1);
        }
        thread::sleep(Duration::from_millis(200));
    }
}
