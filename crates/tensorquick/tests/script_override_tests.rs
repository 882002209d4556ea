//! Table-driven tests for deploy script override rewriting.

mod common;

use common::{overrides, TestHarness};
use tensorquick::deploy::{apply_overrides, apply_overrides_to_file};

/// A single rewrite case.
struct OverrideTestCase {
    /// Test case name for identification.
    name: &'static str,
    input: &'static str,
    overrides: &'static [(&'static str, &'static str)],
    expected: &'static str,
    expected_count: usize,
}

const OVERRIDE_TESTS: &[OverrideTestCase] = &[
    OverrideTestCase {
        name: "single_key",
        input: "TENSOR_QUICK_GPU_TYPE = \"A100-40GB\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "TENSOR_QUICK_GPU_TYPE = \"H100\"\n",
        expected_count: 1,
    },
    OverrideTestCase {
        name: "surrounding_lines_untouched",
        input: "import modal\n\nTENSOR_QUICK_GPU_TYPE = \"T4\"\napp = modal.App(\"x\")\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "L4")],
        expected: "import modal\n\nTENSOR_QUICK_GPU_TYPE = \"L4\"\napp = modal.App(\"x\")\n",
        expected_count: 1,
    },
    OverrideTestCase {
        name: "multiple_keys_keep_order",
        input: "TENSOR_QUICK_B = \"1\"\nTENSOR_QUICK_A = \"2\"\n",
        overrides: &[("TENSOR_QUICK_A", "x"), ("TENSOR_QUICK_B", "y")],
        expected: "TENSOR_QUICK_B = \"y\"\nTENSOR_QUICK_A = \"x\"\n",
        expected_count: 2,
    },
    OverrideTestCase {
        name: "key_not_in_map",
        input: "TENSOR_QUICK_TIMEOUT = \"600\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "TENSOR_QUICK_TIMEOUT = \"600\"\n",
        expected_count: 0,
    },
    OverrideTestCase {
        name: "key_without_prefix",
        input: "GPU_TYPE = \"T4\"\n",
        overrides: &[("GPU_TYPE", "H100")],
        expected: "GPU_TYPE = \"T4\"\n",
        expected_count: 0,
    },
    OverrideTestCase {
        name: "compact_spacing_normalized",
        input: "TENSOR_QUICK_GPU_TYPE=\"T4\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "TENSOR_QUICK_GPU_TYPE = \"H100\"\n",
        expected_count: 1,
    },
    OverrideTestCase {
        name: "indentation_preserved",
        input: "if True:\n    TENSOR_QUICK_GPU_TYPE = \"T4\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "if True:\n    TENSOR_QUICK_GPU_TYPE = \"H100\"\n",
        expected_count: 1,
    },
    OverrideTestCase {
        name: "trailing_comment_not_matched",
        input: "TENSOR_QUICK_GPU_TYPE = \"T4\"  # default\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "TENSOR_QUICK_GPU_TYPE = \"T4\"  # default\n",
        expected_count: 0,
    },
    OverrideTestCase {
        name: "empty_value",
        input: "TENSOR_QUICK_GPU_TYPE = \"\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "A10G")],
        expected: "TENSOR_QUICK_GPU_TYPE = \"A10G\"\n",
        expected_count: 1,
    },
    OverrideTestCase {
        name: "repeated_assignment",
        input: "TENSOR_QUICK_GPU_TYPE = \"T4\"\nTENSOR_QUICK_GPU_TYPE = \"L4\"\n",
        overrides: &[("TENSOR_QUICK_GPU_TYPE", "H100")],
        expected: "TENSOR_QUICK_GPU_TYPE = \"H100\"\nTENSOR_QUICK_GPU_TYPE = \"H100\"\n",
        expected_count: 2,
    },
];

#[test]
fn test_override_table() {
    for case in OVERRIDE_TESTS {
        let (output, count) = apply_overrides(case.input, &overrides(case.overrides));
        assert_eq!(output, case.expected, "case '{}'", case.name);
        assert_eq!(count, case.expected_count, "case '{}'", case.name);
    }
}

#[test]
fn test_line_count_is_preserved() {
    for case in OVERRIDE_TESTS {
        let (output, _) = apply_overrides(case.input, &overrides(case.overrides));
        assert_eq!(
            output.lines().count(),
            case.input.lines().count(),
            "case '{}'",
            case.name
        );
    }
}

#[test]
fn test_rewrites_script_file_in_place() {
    let harness = TestHarness::new();
    let path = harness.add_script("flux-1-dev");

    let count =
        apply_overrides_to_file(&path, &overrides(&[("TENSOR_QUICK_GPU_TYPE", "H100")])).unwrap();

    assert_eq!(count, 1);
    let script = harness.read_script("flux-1-dev");
    assert_eq!(
        script,
        common::harness::DEFAULT_SCRIPT.replace("\"A100-40GB\"", "\"H100\"")
    );
}
