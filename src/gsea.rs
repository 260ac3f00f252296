use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::GseaParams;
use crate::error::GseaError;
use crate::fs_util;
use crate::joblog::JobLog;
use crate::report::ReportDir;
use crate::strategy::Strategy;

pub const DEFAULT_EXECUTABLE: &str = "gsea-cli.sh";

/// One call of `gsea-cli.sh GSEA ...`.
#[derive(Debug, Clone)]
pub struct GseaInvocation {
    pub matrix: PathBuf,
    pub cls: PathBuf,
    pub comparison: String,
    pub gmx: PathBuf,
    pub strategy: Strategy,
    pub rpt_label: String,
    pub out_dir: PathBuf,
    pub params: GseaParams,
}

impl GseaInvocation {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "GSEA".to_string(),
            "-res".to_string(),
            self.matrix.to_string_lossy().to_string(),
            "-cls".to_string(),
            format!("{}#{}", self.cls.to_string_lossy(), self.comparison),
            "-gmx".to_string(),
            self.gmx.to_string_lossy().to_string(),
            "-collapse".to_string(),
            self.strategy.collapse.as_gsea_arg().to_string(),
        ];
        if let Some(chip) = &self.strategy.chip {
            args.push("-chip".to_string());
            args.push(chip.to_string());
        }
        let pairs: [(&str, String); 22] = [
            ("-mode", "Max_probe".to_string()),
            ("-norm", "meandiv".to_string()),
            ("-nperm", self.params.nperm.to_string()),
            ("-permute", self.params.permute.clone()),
            ("-rnd_seed", self.params.seed.clone()),
            ("-rnd_type", "no_balance".to_string()),
            ("-scoring_scheme", "weighted".to_string()),
            ("-rpt_label", self.rpt_label.clone()),
            ("-metric", "Signal2Noise".to_string()),
            ("-sort", "real".to_string()),
            ("-order", "descending".to_string()),
            ("-create_svgs", "true".to_string()),
            ("-include_only_symbols", "true".to_string()),
            ("-make_sets", "true".to_string()),
            ("-median", "false".to_string()),
            ("-num", "100".to_string()),
            ("-plot_top_x", "20".to_string()),
            ("-save_rnd_lists", "false".to_string()),
            ("-set_max", self.params.set_max.to_string()),
            ("-set_min", self.params.set_min.to_string()),
            ("-zip_report", "false".to_string()),
            ("-out", self.out_dir.to_string_lossy().to_string()),
        ];
        for (flag, value) in pairs {
            args.push(flag.to_string());
            args.push(value);
        }
        args.extend(self.params.extra_args.iter().cloned());
        args
    }

    pub fn command_line(&self, program: &Path) -> String {
        let mut parts = vec![program.to_string_lossy().to_string()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

pub trait GseaRunner: Send + Sync {
    fn run(&self, invocation: &GseaInvocation, log: &mut JobLog) -> Result<(), GseaError>;
}

#[derive(Clone)]
pub struct SystemGseaRunner {
    executable: Option<PathBuf>,
}

impl SystemGseaRunner {
    /// Uses `explicit` when given, otherwise looks up `gsea-cli.sh` on `PATH`.
    pub fn new(explicit: Option<&Path>) -> Self {
        let executable = match explicit {
            Some(path) if path.components().count() > 1 => Some(path.to_path_buf()),
            Some(name) => fs_util::find_in_path(&name.to_string_lossy()),
            None => fs_util::find_in_path(DEFAULT_EXECUTABLE),
        };
        Self { executable }
    }

    pub fn require_executable(&self) -> Result<&Path, GseaError> {
        self.executable
            .as_deref()
            .filter(|path| fs_util::is_executable(path))
            .ok_or_else(|| GseaError::MissingTool(DEFAULT_EXECUTABLE.to_string()))
    }
}

impl GseaRunner for SystemGseaRunner {
    fn run(&self, invocation: &GseaInvocation, log: &mut JobLog) -> Result<(), GseaError> {
        let program = self.require_executable()?;
        let previous = ReportDir::latest(&invocation.out_dir, &invocation.rpt_label)
            .map(|report| report.timestamp);
        log.line(format!("$ {}", invocation.command_line(program)));
        log.flush();

        let status = Command::new(program)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(log.stdio()?)
            .stderr(log.stdio()?)
            .status()
            .map_err(|err| GseaError::GseaRun(format!("spawn {}: {err}", program.display())))?;

        if !status.success() {
            let code = status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(GseaError::GseaRun(format!("exit status {code}")));
        }
        // The report must come from this call, not an earlier run.
        let fresh = ReportDir::latest(&invocation.out_dir, &invocation.rpt_label)
            .is_some_and(|report| previous.is_none_or(|before| report.timestamp > before));
        if !fresh {
            return Err(GseaError::GseaRun(format!(
                "no completed report for {}",
                invocation.rpt_label
            )));
        }
        Ok(())
    }
}

/// Records the command line and reports success without running anything.
#[derive(Clone, Copy, Default)]
pub struct DryRunGseaRunner;

impl GseaRunner for DryRunGseaRunner {
    fn run(&self, invocation: &GseaInvocation, log: &mut JobLog) -> Result<(), GseaError> {
        log.line(format!(
            "dry-run: {}",
            invocation.command_line(Path::new(DEFAULT_EXECUTABLE))
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CollapseMode;

    fn invocation(strategy: Strategy) -> GseaInvocation {
        GseaInvocation {
            matrix: PathBuf::from("/d/GSE1/expr.txt"),
            cls: PathBuf::from("/d/GSE1/pheno.cls"),
            comparison: "DOX_versus_CTRL".to_string(),
            gmx: PathBuf::from("/sets/UP_GENES.gmt"),
            strategy,
            rpt_label: "GSE1_Upregulated".to_string(),
            out_dir: PathBuf::from("/out/results"),
            params: GseaParams::default(),
        }
    }

    #[test]
    fn args_include_chip_only_when_collapsing() {
        let args = invocation(Strategy {
            collapse: CollapseMode::NoCollapse,
            chip: None,
            tag: "no_collapse",
        })
        .args();
        assert_eq!(args[0], "GSEA");
        assert!(args.contains(&"/d/GSE1/pheno.cls#DOX_versus_CTRL".to_string()));
        assert!(args.contains(&"No_Collapse".to_string()));
        assert!(!args.contains(&"-chip".to_string()));

        let args = invocation(Strategy {
            collapse: CollapseMode::Collapse,
            chip: Some("/chips/Human_Ensembl.chip".into()),
            tag: "ensembl_collapse",
        })
        .args();
        let chip_at = args.iter().position(|arg| arg == "-chip").unwrap();
        assert_eq!(args[chip_at + 1], "/chips/Human_Ensembl.chip");
        let label_at = args.iter().position(|arg| arg == "-rpt_label").unwrap();
        assert_eq!(args[label_at + 1], "GSE1_Upregulated");
    }

    #[cfg(unix)]
    mod system {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        use assert_matches::assert_matches;
        use camino::Utf8PathBuf;

        use super::*;

        const OLD_REPORT: &str = "GSE1_Upregulated.Gsea.1600000000000";

        fn fake_gsea(dir: &Path, body: &str) -> PathBuf {
            let script = dir.join("gsea-cli.sh");
            fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        fn setup(body: impl FnOnce(&Path) -> String) -> (tempfile::TempDir, SystemGseaRunner, GseaInvocation, JobLog) {
            let temp = tempfile::tempdir().unwrap();
            let out_dir = temp.path().join("results");
            let old = out_dir.join(OLD_REPORT);
            fs::create_dir_all(&old).unwrap();
            fs::write(old.join("index.html"), "<html/>").unwrap();

            let script = fake_gsea(temp.path(), &body(&out_dir));
            let runner = SystemGseaRunner::new(Some(script.as_path()));
            let mut invocation = invocation(Strategy {
                collapse: CollapseMode::NoCollapse,
                chip: None,
                tag: "no_collapse",
            });
            invocation.out_dir = out_dir;
            let log_path = Utf8PathBuf::from_path_buf(temp.path().join("GSE1.log")).unwrap();
            let log = JobLog::create(&log_path).unwrap();
            (temp, runner, invocation, log)
        }

        #[test]
        fn earlier_report_does_not_count_as_success() {
            let (_temp, runner, invocation, mut log) = setup(|_| "exit 0".to_string());
            assert_matches!(runner.run(&invocation, &mut log), Err(GseaError::GseaRun(_)));
        }

        #[test]
        fn newer_report_counts_as_success() {
            let (_temp, runner, invocation, mut log) = setup(|out_dir| {
                let report = out_dir.join("GSE1_Upregulated.Gsea.1700000000000");
                format!(
                    "mkdir -p '{0}' && echo done > '{0}/index.html'",
                    report.display()
                )
            });
            runner.run(&invocation, &mut log).unwrap();
        }

        #[test]
        fn failing_exit_status_is_an_error() {
            let (_temp, runner, invocation, mut log) = setup(|_| "exit 3".to_string());
            let err = runner.run(&invocation, &mut log).unwrap_err();
            assert_matches!(err, GseaError::GseaRun(message) if message.contains("exit status 3"));
        }
    }
}
