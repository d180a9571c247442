//! End-to-end opcode semantics, driven through `interpret` on hand-built
//! bytecode sequences.

mod common;

use common::run;
use silica::{
    Bytecode, ConcreteType, EnumDef, ErrorKind, FormatPreference, InterpValue, JumpTarget,
    MatchArmItem, Opcode, SlotIndex, Span, TraceItem,
};

fn span() -> Span {
    Span::default()
}

fn op(opcode: Opcode) -> Bytecode {
    Bytecode::new(span(), opcode)
}

#[test]
fn add_two_literals() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(3)),
            Bytecode::literal(span(), InterpValue::make_u32(4)),
            op(Opcode::Add),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(7));
    assert_eq!(result.bit_count().unwrap(), 32);
}

#[test]
fn arithmetic_wraps_modulo_width() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 200)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 100)),
            op(Opcode::Add),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 44));
}

#[test]
fn shr_is_arithmetic_for_signed_lhs() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_sbits(8, -1)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 7)),
            op(Opcode::Shr),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_sbits(8, -1));
    assert!(result.is_signed());
}

#[test]
fn shr_is_logical_for_unsigned_lhs() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0x80)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 1)),
            op(Opcode::Shr),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 0x40));
}

#[test]
fn concat_puts_lhs_in_high_bits() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(4, 0b1010)),
            Bytecode::literal(span(), InterpValue::make_ubits(4, 0b0011)),
            op(Opcode::Concat),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 0b1010_0011));
}

#[test]
fn div_floors_for_signed_lhs() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_sbits(32, -7)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, 2)),
            op(Opcode::Div),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_sbits(32, -4));
}

#[test]
fn slice_with_negative_indices() {
    // start and limit are relative to the basis width when negative:
    // start -4 becomes 4, limit -1 becomes 7, so this reads bits [4, 7).
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0b1100_1010)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, -4)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, -1)),
            op(Opcode::Slice),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(3, 0b100));
    assert!(!result.is_signed());
}

#[test]
fn slice_clamps_limit_to_width() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xff)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, 6)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, 100)),
            op(Opcode::Slice),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(2, 0b11));
}

#[test]
fn slice_start_past_limit_is_empty() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xff)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, 6)),
            Bytecode::literal(span(), InterpValue::make_sbits(32, 2)),
            op(Opcode::Slice),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result.bit_count().unwrap(), 0);
}

#[test]
fn width_slice_in_range() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0b1100_1010)),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            Bytecode::width_slice(span(), ConcreteType::ubits(4)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(4, 0b0010));
}

#[test]
fn width_slice_overhanging_window_zero_extends() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0b1100_1010)),
            Bytecode::literal(span(), InterpValue::make_u32(6)),
            Bytecode::width_slice(span(), ConcreteType::sbits(4)),
        ],
        vec![],
    )
    .unwrap();
    // Bits [6, 10) of the zero-extended basis: 0b0011, tagged signed.
    assert_eq!(result, InterpValue::make_sbits(4, 0b0011));
    assert!(result.is_signed());
}

#[test]
fn width_slice_start_past_basis_is_zero() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xff)),
            Bytecode::literal(span(), InterpValue::make_u32(8)),
            Bytecode::width_slice(span(), ConcreteType::ubits(4)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(4, 0));
}

#[test]
fn dup_then_pop_is_identity() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(5)),
            op(Opcode::Dup),
            op(Opcode::Pop),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(5));
}

#[test]
fn swap_exchanges_top_two() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            op(Opcode::Swap),
        ],
        vec![],
    )
    .unwrap();
    // After the swap the earlier literal is on top.
    assert_eq!(result, InterpValue::make_u32(1));
}

#[test]
fn swap_twice_is_identity() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            op(Opcode::Swap),
            op(Opcode::Swap),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(2));
}

#[test]
fn expand_then_create_reconstructs_tuple() {
    let tuple = InterpValue::make_tuple(vec![
        InterpValue::make_ubits(8, 1),
        InterpValue::make_ubits(16, 2),
        InterpValue::make_token(),
    ]);
    // ExpandTuple leaves element 0 on top, so CreateTuple (which reads in
    // stack order) rebuilds the tuple with its elements reversed.
    let result = run(
        vec![
            Bytecode::literal(span(), tuple.clone()),
            op(Opcode::ExpandTuple),
            Bytecode::create_tuple(span(), 3),
        ],
        vec![],
    )
    .unwrap();
    let expected = InterpValue::make_tuple(vec![
        InterpValue::make_token(),
        InterpValue::make_ubits(16, 2),
        InterpValue::make_ubits(8, 1),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn expand_tuple_leaves_element_zero_on_top() {
    let tuple = InterpValue::make_tuple(vec![
        InterpValue::make_ubits(8, 1),
        InterpValue::make_ubits(8, 2),
    ]);
    let result = run(
        vec![Bytecode::literal(span(), tuple), op(Opcode::ExpandTuple)],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 1));
}

#[test]
fn create_array_preserves_push_order() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 1)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 2)),
            Bytecode::create_array(span(), 2),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(
        result.values().unwrap(),
        &[InterpValue::make_ubits(8, 1), InterpValue::make_ubits(8, 2)]
    );
}

#[test]
fn index_into_array_and_tuple() {
    let array = InterpValue::make_array(vec![
        InterpValue::make_ubits(8, 10),
        InterpValue::make_ubits(8, 20),
    ])
    .unwrap();
    let result = run(
        vec![
            Bytecode::literal(span(), array),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            op(Opcode::Index),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 20));

    let err = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(5)),
            Bytecode::literal(span(), InterpValue::make_u32(0)),
            op(Opcode::Index),
        ],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn jump_dest_is_stack_neutral() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(9)),
            Bytecode::jump_dest(span()),
            Bytecode::jump_dest(span()),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(9));
}

#[test]
fn jump_rel_skips_instructions() {
    let result = run(
        vec![
            Bytecode::jump_rel(span(), JumpTarget(2)),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::jump_dest(span()),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(2));
}

#[test]
fn jump_rel_if_pops_condition_and_branches() {
    // if true: skip pushing 1.
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_bool(true)),
            Bytecode::jump_rel_if(span(), JumpTarget(2)),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::jump_dest(span()),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(2));

    // if false: fall through; top of stack is the later literal either
    // way, so check the stack depth via a tuple.
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_bool(false)),
            Bytecode::jump_rel_if(span(), JumpTarget(2)),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::jump_dest(span()),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            Bytecode::create_tuple(span(), 2),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(
        result,
        InterpValue::make_tuple(vec![InterpValue::make_u32(1), InterpValue::make_u32(2)])
    );
}

#[test]
fn jump_landing_off_jump_dest_is_fatal() {
    let err = run(
        vec![
            Bytecode::jump_rel(span(), JumpTarget(1)),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
        ],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("not a jump destination"));
}

#[test]
fn load_out_of_range_is_internal() {
    let err = run(vec![Bytecode::load(span(), SlotIndex(0))], vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn store_pads_slots_with_tokens() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(7)),
            Bytecode::store(span(), SlotIndex(2)),
            Bytecode::load(span(), SlotIndex(1)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_token());
}

#[test]
fn arguments_are_preplaced_in_slots() {
    let result = run(
        vec![
            Bytecode::load(span(), SlotIndex(1)),
            Bytecode::load(span(), SlotIndex(0)),
            op(Opcode::Sub),
        ],
        vec![InterpValue::make_u32(3), InterpValue::make_u32(10)],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(7));
}

#[test]
fn logical_ops_require_boolean_operands() {
    let err = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 1)),
            Bytecode::literal(span(), InterpValue::make_bool(true)),
            op(Opcode::LogicalAnd),
        ],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_bool(true)),
            Bytecode::literal(span(), InterpValue::make_bool(false)),
            op(Opcode::LogicalOr),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(true));
}

#[test]
fn eq_is_structural_and_unsigned_width_1() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_sbits(8, -1)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xff)),
            op(Opcode::Eq),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(true));
    assert!(!result.is_signed());
    assert_eq!(result.bit_count().unwrap(), 1);
}

#[test]
fn cast_enum_to_bits_and_back() {
    let def = EnumDef::new("Opcode");
    let enum_ty = ConcreteType::Enum {
        def: def.clone(),
        signed: false,
        width: 4,
    };
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(4, 3)),
            Bytecode::cast(span(), enum_ty),
            Bytecode::cast(span(), ConcreteType::ubits(4)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(4, 3));
}

#[test]
fn cast_bits_to_array_round_trips() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(12, 0xabc)),
            Bytecode::cast(span(), ConcreteType::array_of(ConcreteType::ubits(4), 3)),
            Bytecode::cast(span(), ConcreteType::ubits(12)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(12, 0xabc));
}

#[test]
fn cast_signed_narrowing_and_widening() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_sbits(8, -2)),
            Bytecode::cast(span(), ConcreteType::sbits(16)),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_sbits(16, -2));
}

#[test]
fn match_arm_tuple_with_binding() {
    let candidate = InterpValue::make_tuple(vec![
        InterpValue::make_ubits(8, 1),
        InterpValue::make_ubits(8, 2),
    ]);
    let pattern = MatchArmItem::Tuple(vec![
        MatchArmItem::Value(InterpValue::make_ubits(8, 1)),
        MatchArmItem::Store(SlotIndex(0)),
    ]);
    let result = run(
        vec![
            Bytecode::literal(span(), candidate),
            Bytecode::match_arm(span(), pattern),
            Bytecode::load(span(), SlotIndex(0)),
            Bytecode::create_tuple(span(), 2),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(
        result,
        InterpValue::make_tuple(vec![InterpValue::make_bool(true), InterpValue::make_ubits(8, 2)])
    );
}

#[test]
fn failing_tuple_pattern_keeps_earlier_stores() {
    // The first sub-item stores, the second mismatches: the match is
    // false but the store sticks.
    let candidate = InterpValue::make_tuple(vec![
        InterpValue::make_ubits(8, 5),
        InterpValue::make_ubits(8, 2),
    ]);
    let pattern = MatchArmItem::Tuple(vec![
        MatchArmItem::Store(SlotIndex(0)),
        MatchArmItem::Value(InterpValue::make_ubits(8, 9)),
    ]);
    let result = run(
        vec![
            Bytecode::literal(span(), candidate),
            Bytecode::match_arm(span(), pattern),
            Bytecode::load(span(), SlotIndex(0)),
            Bytecode::create_tuple(span(), 2),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(
        result,
        InterpValue::make_tuple(vec![InterpValue::make_bool(false), InterpValue::make_ubits(8, 5)])
    );
}

#[test]
fn match_arm_load_compares_bound_name() {
    let pattern = MatchArmItem::Load(SlotIndex(0));
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(7)),
            Bytecode::match_arm(span(), pattern),
        ],
        vec![InterpValue::make_u32(7)],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(true));
}

#[test]
fn wildcard_always_matches() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_token()),
            Bytecode::match_arm(span(), MatchArmItem::Wildcard),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(true));
}

#[test]
fn fail_renders_message_with_stack_values() {
    let err = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(5)),
            Bytecode::fail(
                span(),
                vec![
                    TraceItem::Literal("saw value:".to_string()),
                    TraceItem::Format(FormatPreference::Default),
                ],
            ),
        ],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failure);
    assert!(err.to_string().contains("saw value: 5"), "got: {err}");
}

#[test]
fn trace_pushes_token() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xaa)),
            Bytecode::trace(
                span(),
                vec![
                    TraceItem::Literal("x =".to_string()),
                    TraceItem::Format(FormatPreference::Hex),
                ],
            ),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_token());
}

#[test]
fn trace_formats_consume_right_to_left() {
    // Two formats: the rightmost takes the top of stack. A failure
    // message makes the rendering observable.
    let err = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            Bytecode::fail(
                span(),
                vec![
                    TraceItem::Format(FormatPreference::Default),
                    TraceItem::Literal("then".to_string()),
                    TraceItem::Format(FormatPreference::Default),
                ],
            ),
        ],
        vec![],
    )
    .unwrap_err();
    assert!(err.to_string().contains("1then 2"), "got: {err}");
}

#[test]
fn send_and_recv_are_fifo() {
    let channel = InterpValue::make_channel();
    let result = run(
        vec![
            Bytecode::literal(span(), channel.clone()),
            Bytecode::literal(span(), InterpValue::make_u32(1)),
            Bytecode::new(span(), Opcode::Send),
            Bytecode::literal(span(), channel.clone()),
            Bytecode::literal(span(), InterpValue::make_u32(2)),
            Bytecode::new(span(), Opcode::Send),
            Bytecode::literal(span(), channel.clone()),
            Bytecode::new(span(), Opcode::Recv),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_u32(1));
    // The second payload is still queued.
    assert_eq!(channel.get_channel().unwrap().len(), 1);
}

#[test]
fn recv_on_empty_channel_is_unavailable() {
    let err = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_channel()),
            Bytecode::new(span(), Opcode::Recv),
        ],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[test]
fn empty_bytecode_is_an_internal_error() {
    let err = run(vec![], vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn negate_and_invert() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 1)),
            Bytecode::new(span(), Opcode::Negate),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 0xff));

    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0b1010_1010)),
            Bytecode::new(span(), Opcode::Invert),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_ubits(8, 0b0101_0101));
}

#[test]
fn comparisons_use_lhs_signedness() {
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_sbits(8, -1)),
            Bytecode::literal(span(), InterpValue::make_sbits(8, 1)),
            Bytecode::new(span(), Opcode::Lt),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(true));

    // Same bit patterns, unsigned lhs: 0xff > 1.
    let result = run(
        vec![
            Bytecode::literal(span(), InterpValue::make_ubits(8, 0xff)),
            Bytecode::literal(span(), InterpValue::make_ubits(8, 1)),
            Bytecode::new(span(), Opcode::Lt),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(result, InterpValue::make_bool(false));
}
