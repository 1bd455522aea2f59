use fail::FailScenario;

/// Configures failpoints for the lifetime of the value and turns them off on drop.
pub struct FailpointScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<(String, String)>,
}

impl<'a> FailpointScenario<'a> {
    pub fn setup(failpoints: &[(&str, &str)]) -> FailpointScenario<'a> {
        let scenario = FailScenario::setup();
        let failpoints = failpoints
            .iter()
            .map(|(name, action)| (name.to_string(), action.to_string()))
            .collect::<Vec<_>>();

        for (failpoint, action) in failpoints.iter() {
            fail::cfg(failpoint, action).unwrap()
        }

        Self {
            _scenario: scenario,
            failpoints,
        }
    }
}

impl Drop for FailpointScenario<'_> {
    fn drop(&mut self) {
        for (failpoint, _) in self.failpoints.iter() {
            fail::cfg(failpoint, "off").unwrap()
        }
    }
}
