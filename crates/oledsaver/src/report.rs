use std::io;

/// Describes the OS error behind `err`, if its chain carries one.
///
/// The code is taken from the [`io::Error`] in the chain rather than from
/// `errno`, which may have been overwritten long before the report is written.
pub fn platform_detail(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .find_map(io::Error::raw_os_error)
        .filter(|code| *code != 0)
        .map(|code| io::Error::from_raw_os_error(code).to_string())
}

/// Builds the fatal report: the platform description (when present) on its
/// own line, followed by the failure and its causes.
pub fn compose_report(err: &anyhow::Error, platform: Option<&str>) -> String {
    let primary = format!("{err:#}");
    match platform.map(str::trim).filter(|text| !text.is_empty()) {
        Some(platform) => format!("{platform}\n{primary}"),
        None => primary,
    }
}

/// Reports a fatal failure once, to the log and to stderr.
pub fn report_fatal(err: &anyhow::Error) {
    let message = compose_report(err, platform_detail(err).as_deref());
    tracing::error!("{message}");
    eprintln!("oledsaver: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn report_without_platform_detail_is_the_primary_message() {
        let err = anyhow!("device removed");
        assert_eq!(compose_report(&err, None), "device removed");
        assert_eq!(compose_report(&err, Some("  ")), "device removed");
    }

    #[test]
    fn os_failures_carry_platform_detail() {
        let err = anyhow::Error::new(io::Error::from_raw_os_error(2))
            .context("failed to read pixel shader a.spv");
        let detail = platform_detail(&err).expect("os error in chain");
        assert_eq!(detail, io::Error::from_raw_os_error(2).to_string());
    }

    #[test]
    fn failures_without_os_cause_have_no_platform_detail() {
        // Leave a real errno behind; it must not leak into unrelated reports.
        let _ = std::fs::metadata("/definitely/not/here/oledsaver");
        let err = anyhow!("pixel shader slot 4 was never loaded").context("startup failed");
        assert_eq!(platform_detail(&err), None);

        let synthetic = anyhow::Error::new(io::Error::other("pipe closed"));
        assert_eq!(platform_detail(&synthetic), None);
    }

    #[test]
    fn platform_detail_precedes_the_failure() {
        let err = anyhow!("no adapter").context("startup failed");
        assert_eq!(
            compose_report(&err, Some("Access is denied.")),
            "Access is denied.\nstartup failed: no adapter"
        );
    }
}
