#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const FAN_RPM: Tag = Tag {
    key: "fan_rpm",
    metric: "fanward_fan_rpm",
};

pub const FAN_DUTY: Tag = Tag {
    key: "fan_duty",
    metric: "fanward_fan_duty",
};

pub const TEST_VERDICT: Tag = Tag {
    key: "verdict",
    metric: "fanward_test_verdict",
};

pub const TESTS_RUN: Tag = Tag {
    key: "tests_run",
    metric: "fanward_tests_run_total",
};

pub const TESTS_FAILED: Tag = Tag {
    key: "tests_failed",
    metric: "fanward_tests_failed_total",
};

pub const TESTS_SKIPPED: Tag = Tag {
    key: "tests_skipped",
    metric: "fanward_tests_skipped_total",
};
