// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lectern viewing analytics command-line tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lectern_server_config::ServerConfig;
use lectern_server_viewing::{
	create_pool, AggregationPolicy, SqliteViewingRepository, ViewingService,
};
use lectern_viewing_core::{
	export_csv, generate_batch, raw_role_scoped_id, IdFamily, NewViewingSession, Role,
	RoleScopedId, SessionEvent, SessionFilter, SessionId,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lectern viewing analytics.
#[derive(Parser, Debug)]
#[command(
	name = "lectern-viewing",
	about = "Ingest, aggregate and query video-viewing sessions",
	version
)]
struct Cli {
	/// Config file (defaults to /etc/lectern/viewing.toml)
	#[arg(long, global = true, env = "LECTERN_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print a fresh session ID
	NewSessionId,
	/// Derive the role-scoped ID for a learner
	RoleId {
		learner: String,
		#[arg(long, default_value = "learner")]
		role: String,
		/// Print the identifier even when the role is not recognized
		#[arg(long)]
		raw: bool,
	},
	/// Print a batch of distinct IDs
	Batch {
		#[arg(long, default_value_t = 10)]
		count: usize,
		#[arg(long, value_enum, default_value_t = FamilyArg::Session)]
		family: FamilyArg,
		#[arg(long, default_value = "learner")]
		learner_prefix: String,
		#[arg(long, default_value = "learner")]
		role: String,
	},
	/// Create sessions from a JSON file holding one session or an array
	Ingest { file: PathBuf },
	/// Apply a JSON-encoded player event to a session
	Event { session_id: String, event: String },
	/// Show one session
	GetSession { session_id: String },
	/// List sessions matching a filter
	List {
		#[command(flatten)]
		filter: FilterArgs,
	},
	/// Summary statistics over matching sessions
	Summarize {
		#[command(flatten)]
		filter: FilterArgs,
	},
	/// Export matching sessions as flat rows
	Export {
		#[command(flatten)]
		filter: FilterArgs,
		#[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
		format: ExportFormat,
	},
	/// Show (or rebuild) a video's performance aggregate
	VideoAggregate {
		video_id: String,
		#[arg(long)]
		recompute: bool,
	},
	/// Show (or rebuild) a learner's analytics aggregate
	UserAggregate {
		user_id: String,
		#[arg(long)]
		recompute: bool,
	},
	/// Skill scores for one session
	Score { session_id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FamilyArg {
	Session,
	Role,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportFormat {
	Csv,
	Json,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
	#[arg(long)]
	user: Option<String>,
	#[arg(long)]
	role_scoped_id: Option<String>,
	#[arg(long)]
	video: Option<String>,
	/// Earliest start time (RFC 3339, inclusive)
	#[arg(long)]
	from: Option<DateTime<Utc>>,
	/// Latest start time (RFC 3339, inclusive)
	#[arg(long)]
	to: Option<DateTime<Utc>>,
	#[arg(long)]
	skill_level: Option<String>,
	#[arg(long)]
	completed: Option<bool>,
}

impl From<FilterArgs> for SessionFilter {
	fn from(args: FilterArgs) -> Self {
		SessionFilter {
			user_id: args.user,
			role_scoped_id: args.role_scoped_id,
			video_id: args.video,
			from: args.from,
			to: args.to,
			skill_level: args.skill_level,
			completed: args.completed,
		}
	}
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn parse_session_id(raw: &str) -> anyhow::Result<SessionId> {
	raw.parse()
		.with_context(|| format!("'{raw}' is not a valid session ID"))
}

fn parse_ingest(content: &str) -> anyhow::Result<Vec<NewViewingSession>> {
	let value: serde_json::Value = serde_json::from_str(content)?;
	let sessions = if value.is_array() {
		serde_json::from_value(value)?
	} else {
		vec![serde_json::from_value(value)?]
	};
	Ok(sessions)
}

/// Commands that need neither configuration nor storage.
fn run_offline(command: &Command) -> anyhow::Result<bool> {
	match command {
		Command::NewSessionId => {
			println!("{}", SessionId::generate());
		}
		Command::RoleId { learner, role, raw } => {
			let role = Role::from(role.as_str());
			if *raw {
				println!("{}", raw_role_scoped_id(learner, role));
			} else {
				println!("{}", RoleScopedId::generate(learner, role)?);
			}
		}
		Command::Batch {
			count,
			family,
			learner_prefix,
			role,
		} => {
			let family = match family {
				FamilyArg::Session => IdFamily::Session,
				FamilyArg::Role => IdFamily::RoleScoped {
					learner_prefix: learner_prefix.clone(),
					role: Role::from(role.as_str()),
				},
			};
			for id in generate_batch(*count, &family)? {
				println!("{id}");
			}
		}
		_ => return Ok(false),
	}
	Ok(true)
}

async fn open_service(config: &ServerConfig) -> anyhow::Result<ViewingService> {
	let pool = create_pool(&config.database.url, config.database.busy_timeout())
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;

	let policy = AggregationPolicy {
		recompute_on_write: config.aggregation.recompute_on_write,
		recompute_user_on_write: config.aggregation.recompute_user_on_write,
	};
	Ok(ViewingService::new(
		Arc::new(SqliteViewingRepository::new(pool)),
		policy,
	))
}

async fn run(service: &ViewingService, command: Command) -> anyhow::Result<()> {
	match command {
		Command::Ingest { file } => {
			let content = std::fs::read_to_string(&file)
				.with_context(|| format!("reading {}", file.display()))?;
			let inputs = parse_ingest(&content)?;
			let total = inputs.len();
			let mut failed = 0usize;
			for input in inputs {
				let id = input.id.clone();
				match service.create_session(input).await {
					Ok(session) => println!("{}", session.id),
					Err(e) => {
						failed += 1;
						tracing::warn!(session_id = %id, error = %e, "session rejected");
					}
				}
			}
			tracing::info!(total, failed, "ingest finished");
			if failed > 0 {
				bail!("{failed} of {total} sessions rejected");
			}
		}
		Command::Event { session_id, event } => {
			let id = parse_session_id(&session_id)?;
			let event: SessionEvent =
				serde_json::from_str(&event).context("parsing event JSON")?;
			print_json(&service.record_event(&id, event).await?)?;
		}
		Command::GetSession { session_id } => {
			let id = parse_session_id(&session_id)?;
			print_json(&service.get_session(&id).await?)?;
		}
		Command::List { filter } => {
			print_json(&service.list_sessions_filtered(&filter.into()).await?)?;
		}
		Command::Summarize { filter } => {
			print_json(&service.summarize(&filter.into()).await?)?;
		}
		Command::Export { filter, format } => {
			let rows = service.export(&filter.into()).await?;
			match format {
				ExportFormat::Csv => print!("{}", export_csv(&rows)),
				ExportFormat::Json => print_json(&rows)?,
			}
		}
		Command::VideoAggregate {
			video_id,
			recompute,
		} => {
			let aggregate = if recompute {
				service.recompute_video_aggregate(&video_id).await?
			} else {
				service.get_video_aggregate(&video_id).await?
			};
			print_json(&aggregate)?;
		}
		Command::UserAggregate { user_id, recompute } => {
			let aggregate = if recompute {
				service.recompute_user_aggregate(&user_id).await?
			} else {
				service.get_user_aggregate(&user_id).await?
			};
			print_json(&aggregate)?;
		}
		Command::Score { session_id } => {
			let id = parse_session_id(&session_id)?;
			let scores = service.score_session(&id).await?;
			print_json(&serde_json::json!({
				"session_id": id,
				"scores": scores,
				"proficiency": scores.proficiency().to_string(),
			}))?;
		}
		Command::NewSessionId | Command::RoleId { .. } | Command::Batch { .. } => {
			bail!("identifier commands run without storage")
		}
	}
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	if run_offline(&cli.command)? {
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &cli.config {
		Some(path) => lectern_server_config::load_config_with_file(path)?,
		None => lectern_server_config::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	tracing::debug!(database = %config.database.url, "opening viewing store");
	let service = open_service(&config).await?;
	let policy = service.policy();
	tracing::debug!(
		recompute_on_write = policy.recompute_on_write,
		recompute_user_on_write = policy.recompute_user_on_write,
		"viewing service ready"
	);
	run(&service, cli.command).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn test_cli_definition() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_filter_args_parse() {
		let cli = Cli::parse_from([
			"lectern-viewing",
			"summarize",
			"--user",
			"user-1",
			"--from",
			"2026-03-01T00:00:00Z",
			"--completed",
			"true",
		]);
		let Command::Summarize { filter } = cli.command else {
			panic!("expected summarize");
		};
		let filter: SessionFilter = filter.into();
		assert_eq!(filter.user_id.as_deref(), Some("user-1"));
		assert_eq!(
			filter.from.map(|t| t.to_rfc3339()),
			Some("2026-03-01T00:00:00+00:00".to_string())
		);
		assert_eq!(filter.completed, Some(true));
		assert!(filter.video_id.is_none());
	}

	#[test]
	fn test_export_defaults_to_csv() {
		let cli = Cli::parse_from(["lectern-viewing", "export", "--video", "video-1"]);
		let Command::Export { format, filter } = cli.command else {
			panic!("expected export");
		};
		assert_eq!(format, ExportFormat::Csv);
		assert_eq!(filter.video.as_deref(), Some("video-1"));
	}

	#[test]
	fn test_offline_commands_skip_storage() {
		assert!(run_offline(&Command::NewSessionId).unwrap());
		assert!(run_offline(&Command::Batch {
			count: 3,
			family: FamilyArg::Role,
			learner_prefix: "learner".to_string(),
			role: "evaluator".to_string(),
		})
		.unwrap());
		assert!(!run_offline(&Command::Score {
			session_id: "SABCDEFGHIJK".to_string(),
		})
		.unwrap());
	}

	#[test]
	fn test_unknown_role_needs_raw() {
		let strict = Command::RoleId {
			learner: "alice".to_string(),
			role: "guest".to_string(),
			raw: false,
		};
		assert!(run_offline(&strict).is_err());

		let raw = Command::RoleId {
			learner: "alice".to_string(),
			role: "guest".to_string(),
			raw: true,
		};
		assert!(run_offline(&raw).unwrap());
	}

	#[test]
	fn test_parse_ingest_single_and_array() {
		let one = r#"{
			"id": "SABCDEFGHIJK",
			"user_id": "user-1",
			"role_scoped_id": "1LABCDE",
			"video_id": "video-1",
			"video_duration_seconds": 600.0
		}"#;
		assert_eq!(parse_ingest(one).unwrap().len(), 1);

		let many = format!("[{one}, {one}]");
		assert_eq!(parse_ingest(&many).unwrap().len(), 2);

		assert!(parse_ingest("{\"id\": 3}").is_err());
	}
}
