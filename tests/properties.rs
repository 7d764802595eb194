//! Property tests for runtime module operations

use std::rc::Rc;
use std::sync::Arc;

use proptest::prelude::*;

use modrt::Context;
use modrt::bytecode::{BytecodeBuilder, BytecodeProvider};
use modrt::runtime::{
    ModuleState, RuntimeModule, RuntimeModuleFlags, can_generate_literal_hidden_class_cache_key,
};

/// Strings as `(name index, is identifier)`; small name ranges give duplicates
fn strings() -> impl Strategy<Value = Vec<(u32, bool)>> {
    prop::collection::vec((0u32..24, any::<bool>()), 1..40)
}

fn build_unit(strings: &[(u32, bool)], functions: u32) -> Arc<dyn BytecodeProvider> {
    let mut b = BytecodeBuilder::new();
    for &(n, identifier) in strings {
        let s = format!("name{}", n);
        if identifier {
            b.add_identifier(&s);
        } else {
            b.add_string(&s);
        }
    }
    for i in 0..functions {
        b.add_function(i % strings.len() as u32, i % 4, 8, vec![i as u8]);
    }
    b.build_shared()
}

fn load(ctx: &mut Context, unit: Arc<dyn BytecodeProvider>) -> Rc<RuntimeModule> {
    let domain = ctx.create_domain();
    ctx.add_root(domain);
    RuntimeModule::create(ctx, domain, unit, RuntimeModuleFlags::new(), "prop.js").unwrap()
}

proptest! {
    #[test]
    fn symbol_resolution_is_stable(strings in strings()) {
        let mut ctx = Context::new();
        let rm = load(&mut ctx, build_unit(&strings, 1));

        for id in 0..strings.len() as u32 {
            let first = rm.get_symbol_id_from_string_id(ctx.identifiers_mut(), id);
            let second = rm.get_symbol_id_from_string_id(ctx.identifiers_mut(), id);
            prop_assert_eq!(first, second);
            prop_assert_eq!(rm.get_symbol_id_must_exist(id), first);
        }

        // Equal contents map to one symbol regardless of the string kind
        for (i, a) in strings.iter().enumerate() {
            for (j, b) in strings.iter().enumerate() {
                if a.0 == b.0 {
                    prop_assert_eq!(
                        rm.get_symbol_id_must_exist(i as u32),
                        rm.get_symbol_id_must_exist(j as u32)
                    );
                }
            }
        }
    }

    #[test]
    fn code_blocks_are_materialized_once(
        strings in strings(),
        functions in 1u32..32,
        picks in prop::collection::vec(any::<u32>(), 1..64),
    ) {
        let mut ctx = Context::new();
        let rm = load(&mut ctx, build_unit(&strings, functions));

        let first: Vec<_> = (0..functions).map(|i| rm.get_code_block(&mut ctx, i)).collect();
        for pick in picks {
            let index = pick % functions;
            let block = rm.get_code_block(&mut ctx, index);
            prop_assert!(Rc::ptr_eq(&block, &first[index as usize]));
            prop_assert_eq!(block.function_id(), index);
            prop_assert!(block.is_owned_by(&rm));
        }
    }

    #[test]
    fn literal_cache_respects_key_range(
        key_buffer_index in any::<u32>(),
        num_literals in 0u32..512,
    ) {
        let mut ctx = Context::new();
        let rm = load(&mut ctx, build_unit(&[(0, true)], 1));
        let class = ctx.alloc_hidden_class(None, &[]);

        rm.try_cache_literal_hidden_class(key_buffer_index, num_literals, class);
        let found = rm.find_cached_literal_hidden_class(ctx.heap(), key_buffer_index, num_literals);
        if can_generate_literal_hidden_class_cache_key(key_buffer_index, num_literals) {
            prop_assert_eq!(found, Some(class));
        } else {
            prop_assert_eq!(found, None);
        }
    }

    #[test]
    fn initialize_without_cjs_modules_accepts_any_table(
        strings in strings(),
        functions in 1u32..16,
        statics in prop::collection::vec((0u32..4, 0u32..64), 0..8),
    ) {
        let mut b = BytecodeBuilder::new();
        for &(n, identifier) in &strings {
            let s = format!("name{}", n);
            if identifier {
                b.add_identifier(&s);
            } else {
                b.add_string(&s);
            }
        }
        for _ in 0..functions {
            b.add_function(0, 0, 0, Vec::new());
        }
        // Duplicate ids and out-of-range functions are never looked at
        for &(module, function) in &statics {
            b.add_cjs_module_static(module, function);
        }
        b.add_cjs_module(0, functions + 3);

        let mut ctx = Context::new();
        let domain = ctx.create_domain();
        let rm = RuntimeModule::create_uninitialized(&mut ctx, domain, RuntimeModuleFlags::new());
        rm.initialize_without_cjs_modules(&mut ctx, b.build_shared());

        prop_assert_eq!(rm.state(), ModuleState::Ready);
        prop_assert_eq!(rm.string_count(), strings.len() as u32);
        prop_assert_eq!(rm.code_block_count(), functions);
        prop_assert_eq!(ctx.heap().get(domain).unwrap().cjs_module_count(), 0);
    }
}
