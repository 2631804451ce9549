use fast_logger::fragment::{compile, ArgType, Fragment};
use fast_logger::{ArgKind, CompileError};

#[test]
fn test_argument_types_in_call_order() {
    let program = compile("%d %hhi %lu %lld %zx %td %jd %p %s %ls %c %lc %f %Lg %a", 15).unwrap();
    let types: Vec<ArgType> = program.arg_types().collect();
    assert_eq!(
        types,
        [
            ArgType::Int,
            ArgType::SignedChar,
            ArgType::UnsignedLong,
            ArgType::LongLong,
            ArgType::Size,
            ArgType::PtrDiff,
            ArgType::IntMax,
            ArgType::Pointer,
            ArgType::Str,
            ArgType::WideStr,
            ArgType::Int,
            ArgType::WInt,
            ArgType::Double,
            ArgType::LongDouble,
            ArgType::Double,
        ]
    );
    assert_eq!(program.fragment_count(), 15);
    assert_eq!(program.typed_count(), 15);
}

#[test]
fn test_compile_is_deterministic() {
    let format = "user=%s id=%08x score=%.2f";
    let a = compile(format, 3).unwrap();
    let b = compile(format, 3).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
    assert_eq!(a, b);
}

#[test]
fn test_trailing_text_extends_last_fragment() {
    let program = compile("%s=%d;\n", 2).unwrap();
    let suffixes: Vec<&str> = program
        .iter()
        .map(|fragment| match fragment {
            Fragment::Typed { suffix, .. } => suffix,
            Fragment::Literal(_) => panic!("unexpected literal fragment"),
        })
        .collect();
    assert_eq!(suffixes, ["", ";\n"]);
}

#[test]
fn test_fragment_spans_reconstruct_format() {
    let format = "[%-10s] %5.1f%% of %lu (%p) done";
    let program = compile(format, 4).unwrap();
    let mut rebuilt = String::new();
    program.write_source(&mut rebuilt);
    assert_eq!(rebuilt, format);
}

#[test]
fn test_spec_details_are_kept() {
    let program = compile("%-+8.3lld", 1).unwrap();
    match program.iter().next() {
        Some(Fragment::Typed { spec, spec_text, .. }) => {
            assert_eq!(spec_text, "%-+8.3lld");
            assert!(spec.flags.left);
            assert!(spec.flags.plus);
            assert_eq!(spec.conversion, b'd');
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_malformed_reports_position() {
    match compile("ok %d then 5%", 1) {
        Err(CompileError::MalformedSpecifier { offset, text }) => {
            assert_eq!(offset, 12);
            assert_eq!(text, "%");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_argument_count_must_match() {
    assert_eq!(
        compile("no conversions", 1),
        Err(CompileError::ArgumentCountMismatch { expected: 0, declared: 1 })
    );
    assert_eq!(
        compile("%s %s", 3),
        Err(CompileError::ArgumentCountMismatch { expected: 2, declared: 3 })
    );
}

#[test]
fn test_dynamic_width_and_precision_rejected() {
    assert_eq!(
        compile("%.*s", 2),
        Err(CompileError::DynamicWidthOrPrecision { spec: "%.*s".to_string() })
    );
    assert!(matches!(
        compile("%*d", 2),
        Err(CompileError::DynamicWidthOrPrecision { .. })
    ));
}

#[test]
fn test_argument_kinds_checked_against_conversions() {
    let program = compile("%d %s %f %p %c", 5).unwrap();
    assert_eq!(
        program.check_arguments([ArgKind::Unsigned, ArgKind::Str, ArgKind::Float, ArgKind::Pointer, ArgKind::Char]),
        Ok(())
    );
    assert_eq!(
        program.check_arguments([ArgKind::Signed, ArgKind::Signed, ArgKind::Float, ArgKind::Pointer, ArgKind::Char]),
        Err(CompileError::ArgumentTypeMismatch {
            index: 1,
            expected: ArgType::Str,
            found: ArgKind::Signed,
        })
    );
    assert!(matches!(
        program.check_arguments([ArgKind::Signed, ArgKind::Str, ArgKind::Signed, ArgKind::Pointer, ArgKind::Char]),
        Err(CompileError::ArgumentTypeMismatch { index: 2, .. })
    ));
    assert!(!ArgType::Pointer.accepts(ArgKind::Str));
    assert!(ArgType::Pointer.accepts(ArgKind::Unsigned));
}

#[test]
fn test_oversized_width_rejected() {
    match compile("pad %999999999d", 1) {
        Err(CompileError::MalformedSpecifier { offset, .. }) => assert_eq!(offset, 4),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        compile("%.100000f", 1),
        Err(CompileError::MalformedSpecifier { offset: 0, .. })
    ));
    assert!(compile("%20.3f", 1).is_ok());
}
