use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::time::{Duration, Instant};
use tracing::{error, info};

use starsim::benchmark::ModelBenchmark;
use starsim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use starsim::model::{Model, TriggerKind};
use starsim::scenario::{ModelFactory, ScenarioConfig, ScenarioFactory};

/// フレームトリガー使用時の描画ループ間隔（約60Hz）
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn build_cli() -> Command {
    Command::new("starsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("宇宙戦闘シミュレーション (Space Battle Simulation)")
        .long_about(
            "エージェントベースの宇宙戦闘シミュレーション\n\
             戦闘機の群れ行動・衝突回避・索敵・射撃を時間駆動で計算します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help(
                    "実行するシナリオファイル(.yaml)のパスを指定します。\n\
                     指定しない場合、組み込みの既定シナリオで実行されます。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("steps")
                .long("steps")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("ヘッドレス実行のステップ数（シナリオの設定を上書き）"),
        )
        .arg(
            Arg::new("benchmark")
                .short('b')
                .long("benchmark")
                .value_name("N")
                .value_parser(value_parser!(u64).range(1..))
                .conflicts_with_all(["info", "realtime"])
                .help("N ステップのベンチマークを実行"),
        )
        .arg(
            Arg::new("repeat")
                .long("repeat")
                .value_name("COUNT")
                .value_parser(value_parser!(u32).range(1..))
                .requires("benchmark")
                .help("ベンチマークの繰り返し回数（既定: 1）"),
        )
        .arg(
            Arg::new("realtime")
                .long("realtime")
                .value_name("SECONDS")
                .value_parser(value_parser!(f64))
                .conflicts_with("info")
                .help("シナリオのトリガーで指定秒数だけ実時間実行"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .value_parser(|s: &str| s.parse::<LogOutput>())
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
}

fn main() {
    let matches = build_cli().get_matches();

    let verbose_level = matches.get_count("verbose");
    let base_level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or(tracing::Level::INFO);
    let log_config = LogConfig {
        level: level_for_verbosity(verbose_level, base_level),
        output: matches.get_one::<LogOutput>("log-output").copied().unwrap_or(LogOutput::Console),
        ..LogConfig::default()
    };
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("警告: ログ初期化に失敗しました: {}", e);
            None
        }
    };

    println!("宇宙戦闘シミュレーション - starsim v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let code = match run(&matches, verbose_level) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "RUN_FAILED: 実行に失敗しました");
            eprintln!("エラー: {}", e);
            1
        }
    };

    // 非同期ログを書き出してから終了する
    drop(guard);
    std::process::exit(code);
}

fn run(matches: &ArgMatches, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = match matches.get_one::<String>("scenario") {
        Some(path) => {
            let scenario = ScenarioConfig::from_file(path)?;
            info!(path = %path, "SCENARIO_LOADED: シナリオファイルを読み込みました");
            scenario
        }
        None => ScenarioConfig::builtin_default()?,
    };

    if matches.get_flag("info") {
        scenario.print_summary();
        return Ok(());
    }

    let factory = ScenarioFactory::new(scenario)?;

    if let Some(&runs) = matches.get_one::<u64>("benchmark") {
        let repeat = matches.get_one::<u32>("repeat").copied().unwrap_or(1);
        return run_benchmark(&factory, runs, repeat);
    }

    if let Some(&seconds) = matches.get_one::<f64>("realtime") {
        return run_realtime(&factory, seconds, verbose_level);
    }

    let steps = matches.get_one::<u64>("steps").copied().unwrap_or(factory.config().sim.steps);
    run_headless(&factory, steps, verbose_level)
}

/// 固定刻みで指定ステップ数を計算
fn run_headless(factory: &ScenarioFactory, steps: u64, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let dt = factory.config().sim.dt_s;
    let model = factory.create_headless_model()?;

    // 約5秒（シミュレーション時間）ごとに進行状況を記録
    let progress_every = ((5.0 / dt).round() as u64).max(1);
    model.run(dt, steps, progress_every);

    print_report(&model, verbose_level);
    Ok(())
}

/// シナリオのトリガーで実時間実行
fn run_realtime(factory: &ScenarioFactory, seconds: f64, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    if !(seconds > 0.0) || !seconds.is_finite() {
        return Err(format!("実行時間は正の値を指定してください: {}", seconds).into());
    }
    let model = factory.create_model()?;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds);

    model.start()?;
    info!(status = %model.status(), seconds, "REALTIME_START: 実時間実行を開始しました");
    match factory.config().sim.model.trigger {
        TriggerKind::Timer => std::thread::sleep(deadline.saturating_duration_since(Instant::now())),
        TriggerKind::Frame => {
            while Instant::now() < deadline {
                model.frame();
                std::thread::sleep(FRAME_INTERVAL);
            }
        }
    }
    model.stop();
    info!(status = %model.status(), "REALTIME_STOP: 実時間実行を終了しました");

    print_report(&model, verbose_level);
    Ok(())
}

/// ベンチマークを実行
fn run_benchmark(factory: &ScenarioFactory, runs: u64, repeat: u32) -> Result<(), Box<dyn std::error::Error>> {
    let dt = factory.config().sim.dt_s;
    let benchmark = ModelBenchmark::new(factory, runs, dt)?;
    println!("=== ベンチマーク ===");
    println!("シナリオ: {}", factory.config().meta.name);
    println!("{}", benchmark);
    for _ in 0..repeat {
        println!("{}", benchmark.run()?);
    }
    Ok(())
}

/// 実行結果を表示
fn print_report(model: &Model, verbose_level: u8) {
    println!("{}", model);
    let projectiles = model.projectiles().len();
    model.with_agents(|agents| {
        let alive = agents.iter().filter(|a| a.is_alive()).count();
        println!("生存: {}/{}", alive, agents.len());
        println!("飛翔中の弾: {}", projectiles);
        if verbose_level > 0 {
            println!();
            for agent in agents {
                println!(
                    "  {:<24} {:<10} health={:>9.0} {}",
                    agent.name(),
                    agent.faction().name(),
                    agent.health(),
                    agent.status_text()
                );
            }
        }
    });
}
