use clap::Parser;
use std::path::PathBuf;
use taskforce::cli::commands::agent::AgentCommands;
use taskforce::cli::commands::task::TaskCommands;
use taskforce::cli::{Cli, Commands};
use uuid::Uuid;

#[test]
fn test_parse_serve_flags() {
    let cli =
        Cli::try_parse_from(["taskforce", "serve", "--events", "--skip-startup-recovery"]).unwrap();

    match cli.command {
        Commands::Serve(args) => {
            assert!(args.events);
            assert!(args.skip_startup_recovery);
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["taskforce", "sweep", "--json", "-c", "/tmp/tf.yaml"]).unwrap();

    assert!(matches!(cli.command, Commands::Sweep));
    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/tf.yaml")));
}

#[test]
fn test_parse_task_list_filters() {
    let cli = Cli::try_parse_from([
        "taskforce",
        "task",
        "list",
        "--status",
        "in_progress",
        "-d",
        "qa",
    ])
    .unwrap();

    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::List {
                status,
                department,
                limit,
            } => {
                assert_eq!(status.as_deref(), Some("in_progress"));
                assert_eq!(department.as_deref(), Some("qa"));
                assert_eq!(limit, 50);
            }
            _ => panic!("Wrong task command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_task_controls() {
    let id = Uuid::new_v4();
    let id_arg = id.to_string();

    for verb in ["pause", "cancel", "resume"] {
        let cli = Cli::try_parse_from(["taskforce", "task", verb, id_arg.as_str()]).unwrap();
        let Commands::Task(args) = cli.command else {
            panic!("Wrong top-level command");
        };
        let parsed = match args.command {
            TaskCommands::Pause { task_id }
            | TaskCommands::Cancel { task_id }
            | TaskCommands::Resume { task_id } => task_id,
            _ => panic!("Wrong task command for {verb}"),
        };
        assert_eq!(parsed, id);
    }
}

#[test]
fn test_task_show_requires_valid_id() {
    assert!(Cli::try_parse_from(["taskforce", "task", "show", "not-a-uuid"]).is_err());

    let id = Uuid::new_v4().to_string();
    let cli =
        Cli::try_parse_from(["taskforce", "task", "show", id.as_str(), "--logs", "5"]).unwrap();
    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::Show { logs, .. } => assert_eq!(logs, 5),
            _ => panic!("Wrong task command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_reconcile_and_agents() {
    let id = Uuid::new_v4();
    let id_arg = id.to_string();
    let cli = Cli::try_parse_from(["taskforce", "reconcile", "--task", id_arg.as_str()]).unwrap();
    match cli.command {
        Commands::Reconcile(args) => assert_eq!(args.task, Some(id)),
        _ => panic!("Wrong top-level command"),
    }

    let cli = Cli::try_parse_from(["taskforce", "agent", "list", "--role", "team_leader"]).unwrap();
    match cli.command {
        Commands::Agent(args) => match args.command {
            AgentCommands::List { role, department, .. } => {
                assert_eq!(role.as_deref(), Some("team_leader"));
                assert!(department.is_none());
            }
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_init_force_and_unknown_command() {
    let cli = Cli::try_parse_from(["taskforce", "init", "--force"]).unwrap();
    match cli.command {
        Commands::Init(args) => assert!(args.force),
        _ => panic!("Wrong top-level command"),
    }

    assert!(Cli::try_parse_from(["taskforce", "launch", "now"]).is_err());
}
