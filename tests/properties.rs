//! Property-based checks over the numeric conversion ladder (spec §8
//! "Testable properties": ancestor/convertibility transitivity and
//! reflexivity), run against the bootstrapped built-in type set rather than
//! hand-picked examples.

use nudl_semantic::*;
use quickcheck_macros::quickcheck;

/// One rung of the fixed numeric ladder bootstrapped by [`Env::new`]:
/// `Int8<Int16<Int32<Int`, `UInt8<UInt16<UInt32<UInt`, `Float32<Float64`.
#[derive(Debug, Clone, Copy)]
struct Rung(u8);

impl quickcheck::Arbitrary for Rung {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Rung(u8::arbitrary(g) % 10)
    }
}

fn rung_type(env: &Env, rung: Rung) -> TypeSpecId {
    let b = env.builtin_types();
    match rung.0 {
        0 => b.int8,
        1 => b.int16,
        2 => b.int32,
        3 => b.int,
        4 => b.uint8,
        5 => b.uint16,
        6 => b.uint32,
        7 => b.uint,
        8 => b.float32,
        _ => b.float64,
    }
}

#[quickcheck]
fn convertibility_is_reflexive(rung: Rung) -> bool {
    let env = Env::new();
    let t = rung_type(&env, rung);
    env.types().is_convertible_from(t, t)
}

#[quickcheck]
fn convertibility_is_transitive(a: Rung, b: Rung, c: Rung) -> bool {
    let env = Env::new();
    let (ta, tb, tc) = (rung_type(&env, a), rung_type(&env, b), rung_type(&env, c));
    let types = env.types();
    if types.is_convertible_from(tb, ta) && types.is_convertible_from(tc, tb) {
        types.is_convertible_from(tc, ta)
    } else {
        true
    }
}

#[quickcheck]
fn ancestor_is_reflexive(rung: Rung) -> bool {
    let env = Env::new();
    let t = rung_type(&env, rung);
    env.types().is_ancestor_of(t, t)
}

/// Ancestor is antisymmetric across the fixed ladder: two distinct rungs
/// are never ancestors of each other in both directions (spec §4.2's
/// ordering, not just a preorder).
#[quickcheck]
fn ancestor_is_antisymmetric_across_distinct_rungs(a: Rung, b: Rung) -> bool {
    let env = Env::new();
    let (ta, tb) = (rung_type(&env, a), rung_type(&env, b));
    if ta == tb {
        return true;
    }
    let types = env.types();
    !(types.is_ancestor_of(ta, tb) && types.is_ancestor_of(tb, ta))
}
