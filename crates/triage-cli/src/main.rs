//! bugtool - bug triage reports from the command line
//!
//! ## Commands
//!
//! - `teams`: print the loaded team directory
//! - `classify`: show which team owns a component/subcomponent
//! - `lint`: report order-dependent component claims
//! - `bugs-per-team`: CSV bug counts per team
//! - `bugs-to-teams`: bugs grouped by team, as JSON
//! - `sprint-stats`: CSV of sprint review progress per team
//! - `slo`: evaluate every team's SLO
//! - `notify`: post triage summaries to chat

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use triage_core::{slo, BugLinker, BugSet, OrgDirectory, TeamBugMaps, TeamMap, TriageSummary};
use triage_sources::config::{DEFAULT_BUGZILLA_ENDPOINT, DEFAULT_SIPPY_URL};
use triage_sources::{
    org_source_from_config, tracker_from_config, BugQuery, ChatNotifier, CiPassRateSource,
    CiSourceConfig, OrgSourceConfig, SippyClient, SlackClient, SlackConfig, TrackerConfig,
    ON_ENGINEERING_STATUSES,
};

#[derive(Parser)]
#[command(name = "bugtool")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bug triage reporting", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    sources: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where data comes from.
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Org-data service URL
    #[arg(long, env = "TRIAGE_ORG_DATA_URL", global = true)]
    org_data_url: Option<String>,

    /// Team data file (YAML or JSON); wins over the service
    #[arg(long, env = "TRIAGE_TEAM_DATA", global = true)]
    team_data: Option<PathBuf>,

    /// File layered over the team data
    #[arg(long, env = "TRIAGE_TEAM_OVERRIDE", global = true)]
    team_override: Option<PathBuf>,

    #[arg(long, env = "BUGZILLA_ENDPOINT", default_value = DEFAULT_BUGZILLA_ENDPOINT, global = true)]
    bugzilla_endpoint: String,

    /// File containing the Bugzilla API key
    #[arg(long, env = "BUGZILLA_KEY_FILE", global = true)]
    bugzilla_key: Option<PathBuf>,

    /// Read bugs from this JSON file instead of Bugzilla
    #[arg(long, env = "TRIAGE_TEST_BUG_DATA", global = true)]
    test_bug_data: Option<PathBuf>,

    #[arg(long, env = "TRIAGE_CI_URL", default_value = DEFAULT_SIPPY_URL, global = true)]
    ci_url: String,

    /// File containing the Slack bot token
    #[arg(long, env = "SLACK_TOKEN_FILE", global = true)]
    slack_token_file: Option<PathBuf>,
}

impl SourceArgs {
    fn org_config(&self) -> OrgSourceConfig {
        OrgSourceConfig {
            url: self.org_data_url.clone(),
            path: self.team_data.clone(),
            overlay: self.team_override.clone(),
            ..OrgSourceConfig::default()
        }
    }

    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            api_key_file: self.bugzilla_key.clone(),
            test_data: self.test_bug_data.clone(),
            ..TrackerConfig::new(&self.bugzilla_endpoint)
        }
    }

    fn ci_config(&self) -> CiSourceConfig {
        CiSourceConfig::new(&self.ci_url)
    }

    fn slack_config(&self) -> SlackConfig {
        SlackConfig {
            token_file: self.slack_token_file.clone(),
            ..SlackConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the team directory as JSON
    Teams,

    /// Show the team owning a component/subcomponent pair
    Classify {
        component: String,
        subcomponent: Option<String>,
    },

    /// Report component claims whose owner depends on team order
    Lint,

    /// Count bugs per team after target-release and severity filters
    BugsPerTeam {
        /// Target releases to keep (default: current release and unset)
        #[arg(long, value_delimiter = ',')]
        target_release: Vec<String>,

        #[arg(
            long,
            value_delimiter = ',',
            default_value = "medium,high,urgent,unspecified"
        )]
        severity: Vec<String>,
    },

    /// Print bugs grouped by owning team as JSON
    BugsToTeams,

    /// Per-team totals and bugs reviewed for the upcoming sprint
    SprintStats,

    /// Evaluate team SLOs and print the report as JSON
    Slo {
        /// Exit non-zero when any team is failing
        #[arg(long)]
        check: bool,
    },

    /// Post triage summaries to team channels and assignees
    Notify {
        /// Redirect every message to the debug channel
        #[arg(long)]
        debug: bool,

        #[arg(long, default_value = "#triage-debug")]
        debug_channel: String,

        /// Skip direct messages to assignees
        #[arg(long)]
        no_people: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    triage_core::telemetry::init_tracing(cli.json, level);

    let directory = load_directory(&cli.sources).await?;

    match cli.command {
        Commands::Teams => print_json(&directory),
        Commands::Classify {
            component,
            subcomponent,
        } => {
            let subcomponent = subcomponent.as_deref().unwrap_or("");
            println!("{}", directory.classify(&component, subcomponent));
            Ok(())
        }
        Commands::Lint => cmd_lint(&directory),
        Commands::BugsPerTeam {
            target_release,
            severity,
        } => {
            let bugs = load_bugs(&cli.sources).await?;
            let targets = if target_release.is_empty() {
                vec![
                    directory.current_release()?,
                    triage_core::UNSET_TARGET_RELEASE.to_string(),
                ]
            } else {
                target_release
            };
            let filtered = bugs
                .filter_by_target_release(&targets)
                .filter_by_severity(&severity);
            print!("{}", bugs_per_team_csv(&filtered.team_map(&directory)));
            Ok(())
        }
        Commands::BugsToTeams => {
            let bugs = load_bugs(&cli.sources).await?;
            print_json(&bugs.team_map(&directory))
        }
        Commands::SprintStats => {
            let bugs = load_bugs(&cli.sources).await?;
            print!("{}", sprint_stats_csv(&directory, &bugs.team_map(&directory)));
            Ok(())
        }
        Commands::Slo { check } => {
            let bugs = load_bugs(&cli.sources).await?;
            let ci = SippyClient::new(&cli.sources.ci_config())?;
            cmd_slo(&directory, &bugs, &ci, check).await
        }
        Commands::Notify {
            debug,
            debug_channel,
            no_people,
        } => {
            let bugs = load_bugs(&cli.sources).await?;
            let mut config = cli.sources.slack_config();
            if debug {
                config = config.with_debug(&debug_channel);
            }
            let slack = SlackClient::new(&config).context("Failed to set up Slack client")?;
            let links = BugLinker::new(&cli.sources.bugzilla_endpoint);
            let sent = notify(&directory, &bugs, &links, &slack, !no_people).await?;
            info!(messages = sent, "notifications sent");
            Ok(())
        }
    }
}

async fn load_directory(sources: &SourceArgs) -> Result<OrgDirectory> {
    let source = org_source_from_config(&sources.org_config())?;
    source.load().await.context("Failed to load team directory")
}

async fn load_bugs(sources: &SourceArgs) -> Result<BugSet> {
    let tracker = tracker_from_config(&sources.tracker_config())?;
    tracker
        .search(&BugQuery::open_bugs())
        .await
        .context("Failed to fetch bugs")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_lint(directory: &OrgDirectory) -> Result<()> {
    let findings = directory.lint();
    if findings.is_empty() {
        println!("No ambiguous component claims.");
    }
    for finding in &findings {
        println!("{}", finding);
    }
    Ok(())
}

async fn cmd_slo(
    directory: &OrgDirectory,
    bugs: &BugSet,
    ci: &dyn CiPassRateSource,
    check: bool,
) -> Result<()> {
    let version = directory.current_version()?;
    let rates = ci
        .pass_rates(&version)
        .await
        .context("Failed to fetch CI pass rates")?;
    let on_engineering = bugs.filter_by_status(&ON_ENGINEERING_STATUSES);
    let maps = TeamBugMaps::build(directory, &on_engineering, &format!("{}.0", version));
    let report = slo::evaluate(directory, &maps, &rates);
    print_json(&report)?;

    let failing = report.failing_teams();
    if check && !failing.is_empty() {
        anyhow::bail!("teams failing SLO: {}", failing.join(", "));
    }
    Ok(())
}

/// `team,count` lines, sorted by team.
fn bugs_per_team_csv(map: &TeamMap) -> String {
    map.iter()
        .map(|(team, bugs)| format!("{},{}\n", team, bugs.len()))
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `Name,AllBugs,UpcomingSprintBugs,Managers`, in directory order.
fn sprint_stats_csv(directory: &OrgDirectory, map: &TeamMap) -> String {
    let mut out = String::from("Name,AllBugs,UpcomingSprintBugs,Managers\n");
    for team in directory.teams() {
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&team.name),
            map.count_all(&team.name),
            map.count_reviewed_in_sprint(&team.name),
            csv_field(&team.managers.join(","))
        ));
    }
    out
}

/// Post team reports to team channels and personal reminders to
/// assignees, then a delivery summary to the debug channel.
///
/// Only teams with a channel and at least one bug get a report, and only
/// bugs owned by teams with a channel produce reminders. A failed message
/// is logged and skipped. Returns the number of messages delivered.
async fn notify(
    directory: &OrgDirectory,
    bugs: &BugSet,
    links: &BugLinker,
    notifier: &dyn ChatNotifier,
    people: bool,
) -> Result<usize> {
    let current_release = directory.current_release()?;
    let team_map = bugs.team_map(directory);
    let mut sent = 0;

    if people {
        let with_channel: Vec<&str> = directory
            .teams()
            .iter()
            .filter(|t| !t.slack_chan.is_empty())
            .map(|t| t.name.as_str())
            .collect();
        let owned = bugs.filter_by_teams(directory, &with_channel);
        for (assignee, assigned) in owned.assignee_map().iter() {
            if assignee.is_empty() {
                continue;
            }
            let summary = TriageSummary::from_bugs(assignee, assigned, &current_release);
            let lines = summary.personal_lines(links);
            if lines.is_empty() {
                continue;
            }
            match notifier.message_email(assignee, &lines.join("\n")).await {
                Ok(()) => sent += 1,
                Err(err) => warn!(assignee, error = %err, "failed to notify assignee"),
            }
        }
    }

    let mut reported = Vec::new();
    let mut skipped = Vec::new();
    for team in directory.teams() {
        let team_bugs = team_map.bugs(&team.name);
        if team_bugs.is_empty() || team.slack_chan.is_empty() {
            skipped.push(team.name.as_str());
            continue;
        }
        reported.push(team.name.as_str());
        let summary = TriageSummary::from_bugs(&team.name, team_bugs, &current_release);
        let text = summary.team_lines(links).join("\n");
        match notifier.message_channel(&team.slack_chan, &text).await {
            Ok(()) => sent += 1,
            Err(err) => warn!(team = %team.name, error = %err, "failed to notify team"),
        }
    }

    skipped.sort_unstable();
    match notifier.message_debug(&delivery_summary(&reported, &skipped)).await {
        Ok(()) => sent += 1,
        Err(err) => warn!(error = %err, "failed to post delivery summary"),
    }
    Ok(sent)
}

fn delivery_summary(reported: &[&str], skipped: &[&str]) -> String {
    format!(
        "Sent to team: {}\n\nNot sent to team: {}",
        reported.join(", "),
        skipped.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Bug, CiPassRates, OrgConfig, ReleaseInfo, TeamRule};
    use triage_sources::fakes::{MemoryNotifier, Recipient, StaticCiSource};

    fn directory() -> OrgDirectory {
        let mut node = TeamRule::new("Node", &["Node"]);
        node.slack_chan = "#node".to_string();
        node.managers = vec!["ann".to_string(), "bob".to_string()];
        let mut storage = TeamRule::new("Storage", &["Storage"]);
        storage.slack_chan = "#storage".to_string();
        OrgDirectory::load(OrgConfig {
            teams: vec![node, storage, TeamRule::new("Docs", &["Documentation"])],
            releases: vec![ReleaseInfo::new("4.7", &["4.7.0"])],
            ..Default::default()
        })
        .unwrap()
    }

    fn bug(id: u64, component: &str, severity: &str, assignee: &str) -> Bug {
        Bug {
            id,
            status: "NEW".to_string(),
            severity: severity.to_string(),
            priority: "medium".to_string(),
            component: vec![component.to_string()],
            target_release: vec!["4.7.0".to_string()],
            assigned_to: assignee.to_string(),
            ..Default::default()
        }
    }

    fn bugs() -> BugSet {
        let mut reviewed = bug(3, "Node", "low", "b@example.com");
        reviewed.keywords.push("UpcomingSprint".to_string());
        BugSet::new(vec![
            bug(1, "Node", "high", "a@example.com"),
            bug(2, "Networking", "medium", "a@example.com"),
            reviewed,
        ])
    }

    #[test]
    fn test_bugs_per_team_csv() {
        let dir = directory();
        let csv = bugs_per_team_csv(&bugs().team_map(&dir));
        assert_eq!(csv, "Docs,0\nNode,2\nStorage,0\nunknown,1\n");
    }

    #[test]
    fn test_sprint_stats_csv() {
        let dir = directory();
        let csv = sprint_stats_csv(&dir, &bugs().team_map(&dir));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,AllBugs,UpcomingSprintBugs,Managers");
        assert_eq!(lines[1], "Node,2,1,\"ann,bob\"");
        assert_eq!(lines[2], "Storage,0,0,");
        assert_eq!(lines[3], "Docs,0,0,");
    }

    #[tokio::test]
    async fn test_notify_teams_and_people() {
        let mut set: Vec<Bug> = bugs().iter().cloned().collect();
        set.push(bug(4, "Documentation", "urgent", "c@example.com"));
        set.push(bug(5, "Networking", "urgent", "d@example.com"));
        let notifier = MemoryNotifier::new();
        let links = BugLinker::new("https://bugzilla.example.com");
        let sent = notify(&directory(), &BugSet::new(set), &links, &notifier, true)
            .await
            .unwrap();

        let messages = notifier.sent();
        assert_eq!(sent, messages.len());
        let emailed: Vec<&Recipient> = messages
            .iter()
            .map(|(to, _)| to)
            .filter(|to| matches!(to, Recipient::Email(_)))
            .collect();
        // b@example.com only has a low bug; c and d own bugs of teams without a channel
        assert_eq!(emailed, vec![&Recipient::Email("a@example.com".to_string())]);
        let (_, reminder) = messages
            .iter()
            .find(|(to, _)| matches!(to, Recipient::Email(_)))
            .unwrap();
        assert!(reminder.contains("|1 bugs assigned to a@example.com>"));

        let channels: Vec<&Recipient> = messages
            .iter()
            .map(|(to, _)| to)
            .filter(|to| matches!(to, Recipient::Channel(_)))
            .collect();
        assert_eq!(channels, vec![&Recipient::Channel("#node".to_string())]);
        let (_, report) = messages
            .iter()
            .find(|(to, _)| matches!(to, Recipient::Channel(_)))
            .unwrap();
        assert!(report.starts_with("*Bug report for Node*"));

        let (to, summary) = messages.last().unwrap();
        assert_eq!(*to, Recipient::Debug);
        assert_eq!(summary, "Sent to team: Node\n\nNot sent to team: Docs, Storage");
    }

    #[tokio::test]
    async fn test_notify_without_people() {
        let notifier = MemoryNotifier::new();
        let links = BugLinker::new("https://bz");
        let sent = notify(&directory(), &bugs(), &links, &notifier, false)
            .await
            .unwrap();
        assert_eq!(sent, 2);
        assert!(!notifier
            .sent()
            .iter()
            .any(|(to, _)| matches!(to, Recipient::Email(_))));
    }

    #[tokio::test]
    async fn test_slo_check_fails_on_failing_team() {
        let mut config = directory().to_config();
        config.slo.insert("total".to_string(), triage_core::SloObligation::new(1.0));
        let dir = OrgDirectory::load(config).unwrap();
        let ci = StaticCiSource::new(CiPassRates::new());

        assert!(cmd_slo(&dir, &bugs(), &ci, false).await.is_ok());
        let err = cmd_slo(&dir, &bugs(), &ci, true).await.unwrap_err();
        assert!(err.to_string().contains("Node"));
        assert_eq!(ci.requested(), vec!["4.7".to_string(), "4.7".to_string()]);
    }
}
