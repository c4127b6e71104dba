/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::env;

use ndfunction::Config;
use ndfunction::ExtrapolationType;
use ndfunction::Function;
use ndfunction::InterpolationType;
use ndfunction::ValueKind;
use ndfunction::config;
use ndfunction::config::global;
use tracing_test::traced_test;

const VARS: [&str; 4] = [
    config::DEFAULT_INTERPOLATION_ENV,
    config::DEFAULT_EXTRAPOLATION_ENV,
    config::ENFORCE_SORTED_ENV,
    config::CHECK_VIEW_GENERATION_ENV,
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_from_env() {
    // Environment tests share the process; hold the global lock.
    let _lock = global::lock();
    clear_env();
    assert_eq!(Config::from_env(), Config::default());

    env::set_var(config::DEFAULT_INTERPOLATION_ENV, "constant");
    env::set_var(config::DEFAULT_EXTRAPOLATION_ENV, "Periodic");
    env::set_var(config::CHECK_VIEW_GENERATION_ENV, "false");
    let config = Config::from_env();
    clear_env();

    assert_eq!(config.default_interpolation, InterpolationType::Constant);
    assert_eq!(config.default_extrapolation, ExtrapolationType::Periodic);
    assert!(config.enforce_sorted_arguments);
    assert!(!config.check_view_generation);
}

#[traced_test]
#[test]
fn test_malformed_env_is_ignored() {
    let _lock = global::lock();
    clear_env();
    env::set_var(config::DEFAULT_EXTRAPOLATION_ENV, "sideways");
    env::set_var(config::ENFORCE_SORTED_ENV, "maybe");
    let config = Config::from_env();
    clear_env();

    assert_eq!(config, Config::default());
    assert!(logs_contain("ignoring malformed NDFUNCTION_DEFAULT_EXTRAPOLATION=sideways"));
    assert!(logs_contain("ignoring malformed NDFUNCTION_ENFORCE_SORTED=maybe"));
}

#[test]
fn test_functions_use_global_config() {
    let lock = global::lock();
    clear_env();
    {
        let _guard = lock.override_config(Config {
            default_interpolation: InterpolationType::None,
            default_extrapolation: ExtrapolationType::Linear,
            ..Config::default()
        });
        let f = Function::new("f");
        let x = f.new_variable("x", ValueKind::Float);
        assert_eq!(x.interpolation(), InterpolationType::None);
        assert_eq!(x.extrapolation(), ExtrapolationType::Linear);
    }

    env::set_var(config::DEFAULT_INTERPOLATION_ENV, "constant");
    global::init_from_env();
    clear_env();
    assert_eq!(
        Function::new("g").config().default_interpolation,
        InterpolationType::Constant
    );
    global::init_from_env();
    assert_eq!(global::get(), Config::default());
}

#[traced_test]
#[test]
fn test_init_from_yaml() {
    let lock = global::lock();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ndfunction.yaml");
    std::fs::write(
        &path,
        indoc::indoc! {"
            default_extrapolation: Constant
            check_view_generation: false
        "},
    )
    .unwrap();

    let _guard = lock.override_config(Config::default());
    global::init_from_yaml(&path).unwrap();
    let config = global::get();
    assert_eq!(config.default_extrapolation, ExtrapolationType::Constant);
    assert!(!config.check_view_generation);
    assert!(logs_contain("loaded configuration"));

    assert!(global::init_from_yaml(dir.path().join("missing.yaml")).is_err());
    assert_eq!(global::get(), config);
}
