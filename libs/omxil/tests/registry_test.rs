// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-global core and component lookup.

mod common;

use std::sync::Arc;

use omxil::processors::{PASSTHROUGH_COMPONENT, SINK_COMPONENT};
use omxil::{ChannelCallbacks, ComponentState, CoreConfig, OmxError, PassthroughProcessor};
use serial_test::serial;

fn wide_passthrough() -> Box<dyn omxil::ComponentProcessor> {
    Box::new(PassthroughProcessor::new(omxil::PortDomain::Video, 4, 1 << 20))
}

#[test]
#[serial]
fn test_global_core_lifecycle() {
    assert_eq!(omxil::core().err(), Some(OmxError::NotReady));
    assert_eq!(omxil::deinit(), Err(OmxError::NotReady));

    let core = omxil::init(CoreConfig::default()).unwrap();
    assert!(Arc::ptr_eq(&core, &omxil::core().unwrap()));
    assert_eq!(
        omxil::init(CoreConfig::default()).err(),
        Some(OmxError::IncorrectStateOperation)
    );

    omxil::deinit().unwrap();
    assert_eq!(omxil::core().err(), Some(OmxError::NotReady));
}

#[test]
#[serial]
fn test_components_outlive_deinit() {
    let core = omxil::init(CoreConfig::default()).unwrap();
    let (callbacks, _rx) = ChannelCallbacks::new();
    let sink = core
        .create_component(SINK_COMPONENT, Arc::new(callbacks))
        .unwrap();

    omxil::deinit().unwrap();
    drop(core);

    assert_eq!(sink.get_state(), ComponentState::Loaded);
    sink.destroy().unwrap();
}

#[test]
fn test_builtin_components_are_registered() {
    let core = common::test_core(1 << 20);
    let names = core.component_names();
    assert!(names.contains(&PASSTHROUGH_COMPONENT.to_string()));
    assert!(names.contains(&SINK_COMPONENT.to_string()));

    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    assert_eq!(core.component_name_at(0).unwrap(), names[0]);
    assert_eq!(
        core.component_name_at(names.len()),
        Err(OmxError::NoMore)
    );

    assert_eq!(
        core.roles_of_component(SINK_COMPONENT).unwrap(),
        vec!["sink.null"]
    );
    assert_eq!(
        core.components_of_role("filter.passthrough"),
        vec![PASSTHROUGH_COMPONENT]
    );
    assert_eq!(
        core.roles_of_component("OMX.nobody"),
        Err(OmxError::ComponentNotFound)
    );
}

#[test]
fn test_create_component_by_name() {
    let core = common::test_core(1 << 20);
    let (callbacks, _rx) = ChannelCallbacks::new();
    let callbacks = Arc::new(callbacks);

    assert_eq!(
        core.create_component("OMX.missing", callbacks.clone()).err(),
        Some(OmxError::ComponentNotFound)
    );
    assert_eq!(
        core.create_component("", callbacks.clone()).err(),
        Some(OmxError::InvalidComponentName)
    );

    core.register_component("OMX.test.wide", &["filter.passthrough"], wide_passthrough)
        .unwrap();
    assert_eq!(
        core.register_component("OMX.test.wide", &[], wide_passthrough),
        Err(OmxError::BadParameter)
    );
    assert_eq!(
        core.components_of_role("filter.passthrough"),
        vec![PASSTHROUGH_COMPONENT, "OMX.test.wide"]
    );

    let wide = core.create_component("OMX.test.wide", callbacks).unwrap();
    assert_eq!(wide.name(), "OMX.test.wide");
    assert_eq!(wide.port_count(), 2);
    let def = common::port_definition(&wide, 1);
    assert_eq!(def.buffer_count_actual, 4);
    assert_eq!(def.buffer_size, 1 << 20);
}
