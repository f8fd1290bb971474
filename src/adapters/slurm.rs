use super::run_command;
use crate::error::LookupError;
use crate::period::Period;
use crate::report::AccountingSource;

pub const SACCT_FORMAT: &str = "--format=JobID,Partition,Elapsed,NCPUS,AllocTRES";

/// Accounting data from the `sacct` and `sreport` command line tools
#[derive(Debug, Clone)]
pub struct SlurmCli {
    pub sacct: String,
    pub sreport: String,
}

impl Default for SlurmCli {
    fn default() -> Self {
        Self {
            sacct: "sacct".to_string(),
            sreport: "sreport".to_string(),
        }
    }
}

impl SlurmCli {
    pub fn new(sacct: impl Into<String>, sreport: impl Into<String>) -> Self {
        Self {
            sacct: sacct.into(),
            sreport: sreport.into(),
        }
    }

    pub fn sacct_args(user_id: &str, period: &Period) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            user_id.to_string(),
            SACCT_FORMAT.to_string(),
            "--parsable2".to_string(),
            "-S".to_string(),
            period.start.clone(),
        ];
        if let Some(end) = &period.end {
            args.push("-E".to_string());
            args.push(end.clone());
        }
        args
    }

    pub fn sreport_args(period: &Period) -> Vec<String> {
        let mut args = vec![
            "cluster".to_string(),
            "UserUtilizationByAccount".to_string(),
            format!("start={}", period.start),
        ];
        if let Some(end) = &period.end {
            args.push(format!("end={end}"));
        }
        args.push("format=Login,Used".to_string());
        args
    }
}

impl AccountingSource for SlurmCli {
    fn job_records(&self, user_id: &str, period: &Period) -> Result<String, LookupError> {
        run_command(&self.sacct, &Self::sacct_args(user_id, period)).map_err(LookupError::Accounting)
    }

    fn active_users(&self, period: &Period) -> Result<String, LookupError> {
        run_command(&self.sreport, &Self::sreport_args(period)).map_err(LookupError::Accounting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sacct_args() {
        let period = Period::new("2025-06-01", Some("2025-06-30")).unwrap();
        assert_eq!(
            SlurmCli::sacct_args("ab12cd", &period),
            vec![
                "-u",
                "ab12cd",
                "--format=JobID,Partition,Elapsed,NCPUS,AllocTRES",
                "--parsable2",
                "-S",
                "2025-06-01",
                "-E",
                "2025-06-30",
            ]
        );
    }

    #[test]
    fn test_sreport_args_open_end() {
        let period = Period::new("2025-06-01", None).unwrap();
        assert_eq!(
            SlurmCli::sreport_args(&period),
            vec![
                "cluster",
                "UserUtilizationByAccount",
                "start=2025-06-01",
                "format=Login,Used",
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_accounting_error() {
        let cli = SlurmCli::new("no-such-sacct-binary", "no-such-sreport-binary");
        let period = Period::month("2025-06").unwrap();
        assert!(matches!(
            cli.job_records("u1", &period),
            Err(LookupError::Accounting(_))
        ));
        assert!(matches!(cli.active_users(&period), Err(LookupError::Accounting(_))));
    }
}
