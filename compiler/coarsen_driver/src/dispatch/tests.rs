use super::*;

use pretty_assertions::assert_eq;

fn registry() -> KernelRegistry {
    let registry = KernelRegistry::new();
    registry.register("_Z6vecAddPfS_S_");
    registry.register("_Z14vecAdd_0_1_4_2PfS_S_");
    registry.register("_Z14vecAdd_0_4_1_1PfS_S_");
    registry
}

fn launch(grid: Dim3, block: Dim3) -> Launch {
    Launch {
        kernel: "_Z6vecAddPfS_S_".into(),
        grid,
        block,
    }
}

#[test]
fn parses_the_five_field_form() {
    let config = DispatchConfig::parse("vecAdd,x,thread,4,2").unwrap();
    assert_eq!(
        config,
        DispatchConfig {
            kernel: "vecAdd".into(),
            dim: Dimension::X,
            level: Level::Thread,
            factor: 4,
            stride: 2,
        }
    );
    assert_eq!(config.dim.index(), 0);
    assert_eq!(config.variant_name(), "vecAdd_0_1_4_2");

    let block = DispatchConfig::parse("vecAdd,z,block,8,1").unwrap();
    assert_eq!(block.variant_name(), "vecAdd_2_8_1_1");
}

#[test]
fn malformed_values_are_rejected() {
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,thread,4").unwrap_err(),
        DispatchError::FieldCount(4)
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,thread,4,2,1").unwrap_err(),
        DispatchError::FieldCount(6)
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,warp,4,2").unwrap_err(),
        DispatchError::UnknownLevel("warp".into())
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,w,thread,4,2").unwrap_err(),
        DispatchError::UnknownDimension("w".into())
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,thread,four,2").unwrap_err(),
        DispatchError::InvalidNumber {
            field: "factor",
            value: "four".into()
        }
    );
    assert_eq!(
        DispatchConfig::parse(",x,thread,4,2").unwrap_err(),
        DispatchError::EmptyKernel
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,thread,1,2").unwrap_err(),
        DispatchError::InvalidFactor(1)
    );
    assert_eq!(
        DispatchConfig::parse("vecAdd,x,thread,4,0").unwrap_err(),
        DispatchError::InvalidStride
    );
}

#[test]
fn thread_level_shrinks_the_block() {
    let registry = registry();
    let config = DispatchConfig::parse("vecAdd,x,thread,4,2").unwrap();
    let resolved = registry
        .resolve(&config, &launch(Dim3::new(10, 1, 1), Dim3::new(128, 2, 1)))
        .unwrap();
    assert_eq!(
        resolved,
        Launch {
            kernel: "_Z14vecAdd_0_1_4_2PfS_S_".into(),
            grid: Dim3::new(10, 1, 1),
            block: Dim3::new(32, 2, 1),
        }
    );
}

#[test]
fn block_level_shrinks_the_grid() {
    let registry = registry();
    let config = DispatchConfig::parse("vecAdd,x,block,4,1").unwrap();
    let resolved = registry
        .resolve(&config, &launch(Dim3::new(64, 1, 1), Dim3::new(256, 1, 1)))
        .unwrap();
    assert_eq!(resolved.kernel, "_Z14vecAdd_0_4_1_1PfS_S_");
    assert_eq!(resolved.grid, Dim3::new(16, 1, 1));
    assert_eq!(resolved.block, Dim3::new(256, 1, 1));
}

#[test]
fn geometry_that_cannot_shrink_falls_back() {
    let registry = registry();
    let config = DispatchConfig::parse("vecAdd,x,thread,4,2").unwrap();

    let err = registry
        .resolve(&config, &launch(Dim3::new(1, 1, 1), Dim3::new(4, 1, 1)))
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::StrideTooLarge {
            stride: 2,
            extent: 4,
            factor: 4
        }
    );

    let block = DispatchConfig::parse("vecAdd,x,block,4,1").unwrap();
    let err = registry
        .resolve(&block, &launch(Dim3::new(2, 1, 1), Dim3::new(32, 1, 1)))
        .unwrap_err();
    assert_eq!(err, DispatchError::ScaledToZero { extent: 2, factor: 4 });

    let err = registry
        .resolve(&block, &launch(Dim3::new(6, 1, 1), Dim3::new(32, 1, 1)))
        .unwrap_err();
    assert_eq!(err, DispatchError::Indivisible { extent: 6, factor: 4 });
}

#[test]
fn dispatch_launches_the_original_on_any_mismatch() {
    let registry = registry();
    let original = launch(Dim3::new(10, 1, 1), Dim3::new(128, 1, 1));

    assert_eq!(registry.dispatch(None, original.clone()), original);
    assert_eq!(
        registry.dispatch(Some("vecAdd,x,thread"), original.clone()),
        original
    );
    // Another kernel is configured.
    assert_eq!(
        registry.dispatch(Some("saxpy,x,thread,4,2"), original.clone()),
        original
    );
    // Not pre-compiled.
    assert_eq!(
        registry.dispatch(Some("vecAdd,y,thread,4,2"), original.clone()),
        original
    );

    let coarsened = registry.dispatch(Some("vecAdd,x,thread,4,2"), original.clone());
    assert_eq!(coarsened.kernel, "_Z14vecAdd_0_1_4_2PfS_S_");
    assert_eq!(coarsened.block, Dim3::new(32, 1, 1));
}

#[test]
fn registry_collects_module_kernels() {
    use coarsen_ir::{FunctionBuilder, Module, DEVICE_TRIPLE};

    let mut module = Module::new("kernels", DEVICE_TRIPLE);
    for name in ["_Z6vecAddPf", "_Z14vecAdd_0_1_2_1Pf"] {
        let mut fb = FunctionBuilder::new(name, vec![]);
        fb.ret(None);
        module.add_function(fb.finish());
        module.annotate(name, coarsen_ir::KERNEL_KEY, 1);
    }
    let mut helper = FunctionBuilder::new("_Z6helperv", vec![]);
    helper.ret(None);
    module.add_function(helper.finish());

    let registry = KernelRegistry::new();
    let cache = AnnotationCache::new();
    assert_eq!(registry.register_module(&module, &cache), 2);
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.lookup("vecAdd_0_1_2_1").as_deref(),
        Some("_Z14vecAdd_0_1_2_1Pf")
    );
    assert_eq!(registry.lookup("helper"), None);
}

#[test]
fn dim3_accessors() {
    let dims = Dim3::new(4, 5, 6);
    assert_eq!(dims.get(Dimension::Y), 5);
    assert_eq!(dims.with(Dimension::Z, 2), Dim3::new(4, 5, 2));
    assert_eq!(dims.volume(), 120);
    assert_eq!(dims.to_string(), "(4, 5, 6)");
}
