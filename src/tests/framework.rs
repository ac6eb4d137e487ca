use crate::framework::{best_group_match, TargetFramework};

fn specific(identifier: &str, major: u64, minor: u64) -> TargetFramework {
    TargetFramework::Specific {
        identifier: identifier.to_string(),
        version: (major, minor),
    }
}

#[test]
fn parse_short_and_long_forms() {
    assert_eq!(TargetFramework::parse(""), TargetFramework::Any);
    assert_eq!(TargetFramework::parse("any"), TargetFramework::Any);
    assert_eq!(TargetFramework::parse("net6.0"), specific("net", 6, 0));
    assert_eq!(TargetFramework::parse("net45"), specific("net", 4, 5));
    assert_eq!(
        TargetFramework::parse("netstandard2.0"),
        specific("netstandard", 2, 0)
    );
    assert_eq!(
        TargetFramework::parse(".NETStandard,Version=v2.0"),
        specific("netstandard", 2, 0)
    );
    assert_eq!(
        TargetFramework::parse(".NETFramework,Version=v4.7"),
        specific("net", 4, 7)
    );
}

#[test]
fn compatibility_is_same_identifier_lower_or_equal_version() {
    let net8 = TargetFramework::parse("net8.0");
    assert!(net8.supports(&TargetFramework::parse("net6.0")));
    assert!(net8.supports(&TargetFramework::parse("net8.0")));
    assert!(!net8.supports(&TargetFramework::parse("net9.0")));
    assert!(!net8.supports(&TargetFramework::parse("netstandard2.0")));
    assert!(net8.supports(&TargetFramework::Any));
    assert!(!TargetFramework::Any.supports(&TargetFramework::parse("net6.0")));
}

#[test]
fn best_group_prefers_highest_compatible_then_any() {
    let groups = vec![
        TargetFramework::parse("any"),
        TargetFramework::parse("net5.0"),
        TargetFramework::parse("net7.0"),
        TargetFramework::parse("net9.0"),
    ];
    let target = TargetFramework::parse("net8.0");
    assert_eq!(best_group_match(&target, groups.iter()), Some(2));

    let standard_only = vec![TargetFramework::parse("netstandard2.0")];
    assert_eq!(best_group_match(&target, standard_only.iter()), None);

    let with_fallback = vec![
        TargetFramework::parse("netstandard2.0"),
        TargetFramework::Any,
    ];
    assert_eq!(
        best_group_match(&TargetFramework::parse("native1.0"), with_fallback.iter()),
        Some(1)
    );
    assert_eq!(best_group_match(&TargetFramework::Any, groups.iter()), Some(0));
}
