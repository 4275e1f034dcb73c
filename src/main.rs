// ==========================================
// 评审分配引擎 - 命令行入口
// ==========================================
// 子命令: 数据载入 / 配置 / 求解排队 / worker / 部署
// 数据库: --db 或 COMMITTEE_ASSIGNMENT_DB_PATH，缺省为用户数据目录
// ==========================================

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use committee_assignment::api::MatchingDataset;
use committee_assignment::app::{get_default_db_path, AppState};
use committee_assignment::domain::configuration::ConfigurationContent;
use committee_assignment::domain::types::EdgeKind;
use committee_assignment::engine::{solve_matching, CancellationFlag, DeployOptions};
use committee_assignment::importer::reduced_load::RecruitmentResponse;

/// 委员会评审分配引擎
#[derive(Parser, Debug)]
#[command(name = "committee-assignment")]
#[command(about = "Committee-to-submission assignment engine", long_about = None)]
struct Cli {
    /// SQLite 数据库路径
    #[arg(long, global = true, env = "COMMITTEE_ASSIGNMENT_DB_PATH")]
    db: Option<String>,

    /// 以 JSON 格式输出日志
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 内存求解: 不落库，直接输出分配结果
    Solve(SolveArgs),
    /// 载入数据集（投稿/成员/档案/边）
    Load(FileArgs),
    /// 创建配置
    Create(FileArgs),
    /// 列出全部配置
    List,
    /// 导入亲和度评分文件（CSV/Excel）
    ImportScores(ImportArgs),
    /// 导入冲突文件（CSV/Excel）
    ImportConflicts(ImportArgs),
    /// 计算并写入冲突边
    Conflicts(ConfigArgs),
    /// 按招募回复写入减负容量覆写
    ReducedLoads(ReducedLoadArgs),
    /// 提交求解
    Enqueue(ConfigArgs),
    /// 运行 worker（--once 处理完队列即退出）
    Work(WorkArgs),
    /// 取消求解
    Cancel(ConfigArgs),
    /// 重置配置为 Initialized
    Reset(ConfigArgs),
    /// 部署 Proposed 分配
    Deploy(DeployArgs),
    /// 撤销部署
    Undeploy(ConfigArgs),
    /// 查询配置状态
    Status(ConfigArgs),
    /// 列出配置的分配边
    Assignments(AssignmentsArgs),
}

#[derive(Parser, Debug)]
struct SolveArgs {
    /// 配置 JSON 文件
    #[arg(long)]
    config: PathBuf,

    /// 数据集 JSON 文件
    #[arg(long)]
    dataset: PathBuf,
}

#[derive(Parser, Debug)]
struct FileArgs {
    /// JSON 文件路径
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// 匹配组 id
    #[arg(long)]
    match_group: String,

    /// 文件路径
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ReducedLoadArgs {
    /// 匹配组 id
    #[arg(long)]
    match_group: String,

    /// 招募回复 JSON 文件（按提交时间升序）
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// 配置 id
    config_id: String,
}

#[derive(Parser, Debug)]
struct WorkArgs {
    /// 处理完当前队列后退出
    #[arg(long)]
    once: bool,
}

#[derive(Parser, Debug)]
struct DeployArgs {
    /// 配置 id
    config_id: String,

    /// 替换其他配置的已部署分配
    #[arg(long)]
    overwrite: bool,

    /// 评审改派模式
    #[arg(long)]
    reassign: bool,
}

#[derive(Parser, Debug)]
struct AssignmentsArgs {
    /// 配置 id
    config_id: String,

    /// 边类型: PROPOSED_ASSIGNMENT / DEPLOYED_ASSIGNMENT / ALTERNATE
    #[arg(long, default_value = "PROPOSED_ASSIGNMENT")]
    kind: String,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取文件: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("JSON 解析失败: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_state(db: Option<String>) -> Result<AppState> {
    let db_path = db.unwrap_or_else(get_default_db_path);
    AppState::new(db_path).await.map_err(|e| anyhow!(e))
}

/// 内存求解: 载入数据集到内存库，构图后直接求解
async fn solve_in_memory(args: SolveArgs) -> Result<()> {
    let content: ConfigurationContent = read_json(&args.config)?;
    let dataset: MatchingDataset = read_json(&args.dataset)?;

    let state = open_state(Some(":memory:".to_string())).await?;
    state.matching_api.load_dataset(&dataset)?;
    let config = state.matching_api.create_configuration(content)?;

    let inputs = state.orchestrator.load_inputs(&config)?;
    let settings = state.settings.clone();
    let result = tokio::task::spawn_blocking(move || {
        solve_matching(&settings, &config, &inputs, &CancellationFlag::new())
    })
    .await
    .context("求解任务异常退出")??;

    print_json(&result)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        committee_assignment::logging::init_json();
    } else {
        committee_assignment::logging::init();
    }

    tracing::debug!("{} v{}", committee_assignment::APP_NAME, committee_assignment::VERSION);

    match cli.command {
        Commands::Solve(args) => solve_in_memory(args).await,
        command => {
            let state = open_state(cli.db).await?;
            execute(&state, command).await
        }
    }
}

async fn execute(state: &AppState, command: Commands) -> Result<()> {
    let api = state.matching_api.clone();

    match command {
        Commands::Solve(args) => solve_in_memory(args).await?,
        Commands::Load(args) => {
            let dataset: MatchingDataset = read_json(&args.file)?;
            print_json(&api.load_dataset(&dataset)?)?;
        }
        Commands::Create(args) => {
            let content: ConfigurationContent = read_json(&args.file)?;
            print_json(&api.create_configuration(content)?)?;
        }
        Commands::List => {
            print_json(&api.list_configurations()?)?;
        }
        Commands::ImportScores(args) => {
            print_json(&api.import_affinity_file(&args.match_group, &args.file)?)?;
        }
        Commands::ImportConflicts(args) => {
            print_json(&api.import_conflict_file(&args.match_group, &args.file)?)?;
        }
        Commands::Conflicts(args) => {
            let written = api.compute_conflicts(&args.config_id)?;
            print_json(&serde_json::json!({ "written": written }))?;
        }
        Commands::ReducedLoads(args) => {
            let responses: Vec<RecruitmentResponse> = read_json(&args.file)?;
            print_json(&api.apply_reduced_loads(&args.match_group, &responses)?)?;
        }
        Commands::Enqueue(args) => {
            let task_id = api.submit_run(&args.config_id)?;
            print_json(&serde_json::json!({ "task_id": task_id }))?;
        }
        Commands::Work(args) => {
            if args.once {
                let processed = api.drain_queue().await?;
                print_json(&serde_json::json!({ "processed": processed }))?;
            } else {
                tracing::info!("worker 启动，Ctrl-C 退出");
                state
                    .scheduler
                    .serve(async {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            tracing::error!("无法监听退出信号: {}", e);
                        }
                    })
                    .await?;
            }
        }
        Commands::Cancel(args) => {
            print_json(&api.cancel_run(&args.config_id)?)?;
        }
        Commands::Reset(args) => {
            print_json(&api.reset(&args.config_id)?)?;
        }
        Commands::Deploy(args) => {
            let options = DeployOptions {
                overwrite: args.overwrite,
                enable_reviewer_reassignment: args.reassign,
            };
            print_json(&api.deploy(&args.config_id, options)?)?;
        }
        Commands::Undeploy(args) => {
            print_json(&api.undeploy(&args.config_id)?)?;
        }
        Commands::Status(args) => {
            print_json(&api.get_status(&args.config_id)?)?;
        }
        Commands::Assignments(args) => {
            let kind = EdgeKind::from_db_str(&args.kind.to_uppercase())
                .ok_or_else(|| anyhow!("未知的边类型: {}", args.kind))?;
            print_json(&api.list_assignments(&args.config_id, kind)?)?;
        }
    }

    Ok(())
}
