//! Integration tests for Rocoto workflow XML generation.

use serde_json::{Map, Value};
use srw_workflow::cli::xml::{CreateXmlArgs, run_create_xml};
use srw_workflow::config::Config;
use srw_workflow::error::ConfigError;
use srw_workflow::rocoto::{create_xml, prepare_tasks};
use std::fs;
use tempfile::TempDir;

const WORKFLOW: &str = "\
workflow:
  EXPTDIR: /expt/conus
  DATE_FIRST_CYCL: '2023010100'
rocoto:
  attrs:
    realtime: false
    scheduler: slurm
  entities:
    EXPTDIR: '{{ workflow.EXPTDIR }}'
    LOGDIR: '&EXPTDIR;/log'
  cycledefs:
    forecast:
      - 202301010000 202301020000 24:00:00
    at_start:
      dates: 202301010000 202301010000 24:00:00
      activation_offset: -06:00:00
  log: '&LOGDIR;/FV3LAM_wflow_@Y@m@d@H.log'
  tasks:
    task_make_grid:
      attrs:
        cycledefs: at_start
        maxtries: 2
      command: '&EXPTDIR;/make_grid.sh'
      walltime: '00:20:00'
      nnodes: 1
      envars:
        CDATE:
          cyclestr:
            text: '@Y@m@d@H'
        SCRIPT: grid && orog
    task_not_ready:
      command: ''
    metatask_run_ensemble:
      var:
        mem: ['001', '002']
      task_run_fcst_mem#mem#:
        command: '&EXPTDIR;/run_fcst.sh'
        dependency:
          or_grid:
            taskdep:
              attrs:
                task: make_grid
            datadep_grid:
              text: '&EXPTDIR;/grid/done'
          metataskdep:
            attrs:
              metatask: make_ics
    metatask_empty:
      var:
        mem: '001'
      task_nothing:
        command: null
";

fn rocoto_section(text: &str) -> Map<String, Value> {
    let mut config = Config::from_yaml_str(text).unwrap();
    config
        .dereference_all(&srw_workflow::config::StaticVars::new())
        .unwrap();
    match config.data_mut().remove("rocoto") {
        Some(Value::Object(map)) => map,
        _ => panic!("no rocoto section"),
    }
}

mod document_tests {
    use super::*;

    #[test]
    fn test_header_and_workflow_root() {
        let mut rocoto = rocoto_section(WORKFLOW);
        prepare_tasks(&mut rocoto);
        let xml = create_xml(&rocoto).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE workflow [\n"));
        assert!(xml.contains("<!ENTITY EXPTDIR \"/expt/conus\">"));
        assert!(xml.contains("<!ENTITY LOGDIR \"&EXPTDIR;/log\">"));
        assert!(xml.contains("<workflow realtime=\"F\" scheduler=\"slurm\">"));
        assert!(xml.contains("<cycledef group=\"forecast\">202301010000 202301020000 24:00:00</cycledef>"));
        assert!(xml.contains(
            "<cycledef group=\"at_start\" activation_offset=\"-06:00:00\">202301010000 202301010000 24:00:00</cycledef>"
        ));
        assert!(xml.contains("<cyclestr>&LOGDIR;/FV3LAM_wflow_@Y@m@d@H.log</cyclestr>"));
        assert!(xml.trim_end().ends_with("</workflow>"));
    }

    #[test]
    fn test_tasks_and_envars() {
        let mut rocoto = rocoto_section(WORKFLOW);
        prepare_tasks(&mut rocoto);
        let xml = create_xml(&rocoto).unwrap();

        assert!(xml.contains("<task cycledefs=\"at_start\" maxtries=\"2\" name=\"make_grid\">"));
        assert!(xml.contains("<command>&EXPTDIR;/make_grid.sh</command>"));
        assert!(xml.contains("<name>CDATE</name>"));
        assert!(xml.contains("<cyclestr>@Y@m@d@H</cyclestr>"));
        // Bare ampersands are escaped, entity references are not.
        assert!(xml.contains("<value>grid &amp;&amp; orog</value>"));
        // Node counts feed the experiment setup, not Rocoto.
        assert!(!xml.contains("nnodes"));
        assert!(!xml.contains("not_ready"));
    }

    #[test]
    fn test_metatask_and_dependencies() {
        let mut rocoto = rocoto_section(WORKFLOW);
        prepare_tasks(&mut rocoto);
        let xml = create_xml(&rocoto).unwrap();

        assert!(xml.contains("<metatask name=\"run_ensemble\">"));
        assert!(xml.contains("<var name=\"mem\">001 002</var>"));
        assert!(xml.contains("<task name=\"run_fcst_mem#mem#\">"));
        assert!(xml.contains("<or>"));
        assert!(xml.contains("<taskdep task=\"make_grid\"/>"));
        assert!(xml.contains("<datadep>&EXPTDIR;/grid/done</datadep>"));
        // The dependency on a metatask that does not exist becomes a no-op.
        assert!(!xml.contains("metataskdep"));
        assert!(xml.contains("<left>Invalid metataskdep make_ics removed</left>"));
        // A metatask whose only task has no command is dropped.
        assert!(!xml.contains("empty"));
    }

    #[test]
    fn test_bad_task_key() {
        let rocoto = rocoto_section("rocoto:\n  tasks:\n    grid:\n      command: x\n");
        let err = create_xml(&rocoto).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTaskKey(ref key) if key == "grid"));
    }
}

mod command_tests {
    use super::*;

    #[test]
    fn test_create_xml_from_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("rocoto_defns.yaml");
        fs::write(&config, WORKFLOW).unwrap();
        let outxml = temp.path().join("FV3LAM_wflow.xml");

        let xml = run_create_xml(&CreateXmlArgs {
            config,
            outxml: Some(outxml.clone()),
            dryrun: false,
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&outxml).unwrap(), xml);
        assert!(xml.contains("<metatask name=\"run_ensemble\">"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("rocoto_defns.yaml");
        fs::write(&config, WORKFLOW).unwrap();
        let outxml = temp.path().join("FV3LAM_wflow.xml");

        let xml = run_create_xml(&CreateXmlArgs {
            config,
            outxml: Some(outxml.clone()),
            dryrun: true,
        })
        .unwrap();
        assert!(xml.contains("<workflow"));
        assert!(!outxml.exists());
    }
}
