//! End-to-end suite over wire vectors captured from live SS7 traffic.
//!
//! Every DER capture must decode and re-encode byte-identically.

use tcap::{
    acn, associate_result, diagnostic_user, make_der, new_begin, new_end,
    with_begin_dialogue_request, with_begin_invoke, with_end_dialogue_response,
    with_end_return_result_last, Component, DialoguePdu, MessageType, SourceDiagnostic, Tcap,
};

fn round_trip(hex_input: &str) -> Tcap {
    let wire = hex::decode(hex_input).unwrap();
    let msg = Tcap::parse_der(&wire).unwrap();
    assert_eq!(
        msg.marshal().unwrap(),
        wire,
        "re-encoding must be byte-identical"
    );
    msg
}

#[test]
fn der_captures_round_trip() {
    let captures = [
        // End with two components
        "646049040086e8976b262824060700118605010101a0196117a109060704000001001403a203020100a305a1030201006c30a220020100301b02012d3016040826611042173454f2a00a810891328490000005f2a10c02010102013f300403020240",
        // Begin, invoke sendRoutingInfoForSM
        "62494804004734a86b1e281c060700118605010101a011600f80020780a1090607040000010014036c21a11f02010002012d3017800891328490507608f38101ff820891328490000005f7",
        // End, returnError for sendRoutingInfoForSM
        "643d4904004734a86b262824060700118605010101a0196117a109060704000001001403a203020100a305a1030201006c0da30b02010002010130030a0100",
        // Abort, dialogue version mismatch
        "6732490402b0d1c46b2a2828060700118605010101a01d611b80020780a109060704000001001402a203020101a305a103020102",
        // End, sendRoutingInfoForSM response
        "6455490402b0d1c66b2a2828060700118605010101a01d611b80020780a109060704000001001402a203020100a305a1030201006c21a21f020100301a02012d3015040806031128951337f4a009810791126316002012",
        // Begin, long-message dialogue only
        "62264804008bd0406b1e281c060700118605010101a011600f80020780a109060704000001001903",
        // Continue, long-message dialogue response
        "653448040419000f4904008bd0406b262824060700118605010101a0196117a109060704000001001903a203020100a305a103020100",
        // Continue, invoke mt-forwardSM fragment 1 of 2
        "6581d24804008bd04049040419000f6c81c3a181c002010102012c3081b7800826610011829761f6840891328490000005f704819e4009d047f6dbfe06000042217251400000a00500035f020190e53c0b947fd741e8b0bd0c9abfdb6510bcec26a7dd67d09c5e86cf41693728ffaecb41f2f2393da7cbc3f4f4db0d82cbdfe3f27cee0241d9e5f0bc0c32bfd9ecf71d44479741ecb47b0da2bf41e3771bce2ed3cb203abadc0685dd64d09c1e96d341e4323b6d2fcbd3ee33888e96bfeb6734e8c87edbdf2190bc3c96d7d3f476d94d77d5e70500",
        // Continue, returnResultLast
        "651348040419000f4904008bd0406c05a203020101",
        // End, returnResultLast
        "640d4904008bd0406c05a203020102",
        // Begin, invoke reportSM-DeliveryStatus
        "6247480403c940ec6b1e281c060700118605010101a011600f80020780a1090607040000010014036c1fa11d02010002012f30150407910201068163280407916427417901f00a0101",
        // Begin, invoke mt-forwardSM
        "6281b8480403c93f576b1e281c060700118605010101a011600f80020780a1090607040000010019036c818fa1818c02010002012c308183800874020110261338f38407916427417901f0046e040bd0536152e85c0200004221824143220068c1f1f85d77d341582c360693c16c322c168bc5828865719a5e2683ee693a1ad4b44a4136180ce68281de6e900cf78ac95e321a0b449587dd7373592e2f9341d4372838bd06a9c82ca8e99a2689c8a00b34152641cd309b9cb697e7",
        // Abort with ABRT user information
        "672d490403c93f576b252823060700118605010101a0186416800100be11280f060704000001010101a004a4028000",
        // Begin, invoke alertServiceCentre
        "6240480400d199b06b1a2818060700118605010101a00d600ba1090607040000010017026c1ca11a0201010201403012040891881088775859f70406915418730536",
        // Begin, invoke alertServiceCentre without dialogue
        "622448047c0801f86c1ca11a02010102013130120407917933192122f30407916427417960f1",
        // Begin, invoke forwardSM
        "62818a48048c150d066c8181a17f02010002012e3077800832140080803138f684069169318488880463040b916971101174f40000422182612464805bd2e2b1252d467ff6de6c47efd96eb6a1d056cb0d69b49a10269c098537586e96931965b260d15613da72c29b91261bde72c6a1ad2623d682b5996d58331271375a0d1733eee4bd98ec768bd966b41c0d",
        // Begin, invoke sendRoutingInfo
        "6259480403ed2d126b1a2818060700118605010101a00d600ba1090607040000010005036c35a1330201c5020116302b80049152828883010086079152629610103287050583370000aa0a0a0104040504038090a3ab04030205e0",
        // Continue, invoke forwardSM (short message fragment 2 of 2)
        "655a4804008bd04049040419000f6c4ca14a02010202012c3042800826610011829761f6840891328490000005f7042c4409d047f6dbfe060000422172514000001d0500035f0202cae8ba5c9e2ecb5de377fb157ea9d1b0d93b1e06",
        // End, returnResultLast answering a forwardSM
        "64354904000000016b262824060700118605010101a0196117a109060704000001001903a203020100a305a1030201006c05a203020100",
    ];

    for capture in captures {
        round_trip(capture);
    }
}

#[test]
fn begin_with_invoke_decodes_structurally() {
    let msg = round_trip(
        "62494804004734a86b1e281c060700118605010101a011600f80020780a1090607040000010014036c21a11f02010002012d3017800891328490507608f38101ff820891328490000005f7",
    );
    assert_eq!(msg.message_type(), MessageType::Begin);

    let Tcap::Begin {
        otid,
        dialogue,
        components,
    } = msg
    else {
        panic!("expected Begin");
    };
    assert_eq!(otid.as_bytes(), &[0x00, 0x47, 0x34, 0xA8]);

    let dialogue = dialogue.unwrap();
    assert_eq!(
        dialogue.dialogue_as_id.as_deref(),
        Some(&tcap::DIALOGUE_AS_ID[..])
    );
    let DialoguePdu::Request(aarq) = dialogue.pdu else {
        panic!("expected AARQ");
    };
    assert_eq!(aarq.protocol_version, Some(0x80));
    assert_eq!(
        aarq.application_context_name,
        tcap::acn_name(acn::SHORT_MSG_GATEWAY, acn::VERSION3)
    );

    let portion = components.unwrap();
    let Component::Invoke(invoke) = &portion.component else {
        panic!("expected Invoke");
    };
    assert_eq!(invoke.invoke_id, 0);
    assert_eq!(invoke.op_code, 45);
    assert!(invoke.parameter.is_some());
    assert!(portion.next.is_none());
}

#[test]
fn end_with_return_result_last_decodes_structurally() {
    let msg = round_trip(
        "6455490402b0d1c66b2a2828060700118605010101a01d611b80020780a109060704000001001402a203020100a305a1030201006c21a21f020100301a02012d3015040806031128951337f4a009810791126316002012",
    );

    let Tcap::End {
        dtid,
        dialogue,
        components,
    } = msg
    else {
        panic!("expected End");
    };
    assert_eq!(dtid.as_bytes(), &[0x02, 0xB0, 0xD1, 0xC6]);

    let DialoguePdu::Response(aare) = dialogue.unwrap().pdu else {
        panic!("expected AARE");
    };
    assert_eq!(aare.result, associate_result::ACCEPTED);
    assert_eq!(
        aare.result_source_diagnostic,
        Some(SourceDiagnostic::DialogueServiceUser(diagnostic_user::NULL))
    );

    let portion = components.unwrap();
    let Component::ReturnResultLast(result) = &portion.component else {
        panic!("expected ReturnResultLast");
    };
    assert_eq!(result.invoke_id, 0);
    assert_eq!(result.op_code, Some(45));
    assert!(result.parameter.is_some());
}

#[test]
fn end_with_two_components_builds_a_chain() {
    let msg = round_trip(
        "646049040086e8976b262824060700118605010101a0196117a109060704000001001403a203020100a305a1030201006c30a220020100301b02012d3016040826611042173454f2a00a810891328490000005f2a10c02010102013f300403020240",
    );

    let Tcap::End { components, .. } = msg else {
        panic!("expected End");
    };
    let portion = components.unwrap();
    assert!(matches!(portion.component, Component::ReturnResultLast(_)));
    let tail = portion.next.as_deref().unwrap();
    assert!(matches!(tail.component, Component::Invoke(_)));
    assert!(tail.next.is_none());
    assert_eq!(portion.iter().count(), 2);
}

#[test]
fn abort_carries_an_aare_shaped_u_abort_cause() {
    let msg = round_trip(
        "6732490402b0d1c46b2a2828060700118605010101a01d611b80020780a109060704000001001402a203020101a305a103020102",
    );

    let Tcap::Abort {
        dtid,
        p_abort_cause,
        u_abort_cause,
    } = msg
    else {
        panic!("expected Abort");
    };
    assert_eq!(dtid.as_bytes(), &[0x02, 0xB0, 0xD1, 0xC4]);
    assert_eq!(p_abort_cause, None);

    let DialoguePdu::Response(aare) = u_abort_cause.unwrap().pdu else {
        panic!("expected AARE");
    };
    assert_eq!(aare.result, associate_result::REJECT_PERMANENT);
    assert_eq!(
        aare.result_source_diagnostic,
        Some(SourceDiagnostic::DialogueServiceUser(
            diagnostic_user::APPLICATION_CONTEXT_NOT_SUPPORTED
        ))
    );
}

#[test]
fn indefinite_length_input_parses_through_parse_any() {
    let wire = hex::decode(
        "6443490400519a286b2a2828060700118605010101a01d611b80020780a109060704000001001903a203020100a305a1030201006c80a30b02010002010630030201010000",
    )
    .unwrap();

    let err = Tcap::parse_der(&wire).unwrap_err();
    assert!(err.is_indefinite_length(), "got {err:?}");

    let msg = Tcap::parse_any(&wire).unwrap();
    let Tcap::End { ref components, .. } = msg else {
        panic!("expected End");
    };
    assert!(matches!(
        components.as_ref().unwrap().component,
        Component::ReturnError(_)
    ));

    // The canonical form is strictly shorter, reparses to the same message
    // and is what marshalling produces.
    let der = make_der(&wire).unwrap();
    assert!(der.len() < wire.len());
    assert_eq!(make_der(&der).unwrap(), der);
    assert_eq!(Tcap::parse_der(&der).unwrap(), msg);
    assert_eq!(msg.marshal().unwrap(), der);
}

#[test]
fn boolean_marker_is_normalised_by_make_der() {
    let input =
        hex::decode("3019800a915282051447720982f9810101820891328490001015f8").unwrap();
    let expected =
        hex::decode("3019800a915282051447720982f98101ff820891328490001015f8").unwrap();
    assert_eq!(make_der(&input).unwrap(), expected);
    assert_eq!(make_der(&expected).unwrap(), expected);
}

#[test]
fn builder_reproduces_a_live_begin_capture() {
    let parameter =
        hex::decode("3017800891328490507608f38101ff820891328490000005f7").unwrap();
    let msg = new_begin(
        [0x00, 0x47, 0x34, 0xA8],
        [
            with_begin_dialogue_request(acn::SHORT_MSG_GATEWAY, acn::VERSION3),
            with_begin_invoke(0, 45, Some(parameter)),
        ],
    )
    .unwrap();

    let expected = hex::decode(
        "62494804004734a86b1e281c060700118605010101a011600f80020780a1090607040000010014036c21a11f02010002012d3017800891328490507608f38101ff820891328490000005f7",
    )
    .unwrap();
    assert_eq!(msg.marshal().unwrap(), expected);
}

#[test]
fn builder_reproduces_a_live_end_capture() {
    let parameter =
        hex::decode("3015040806031128951337f4a009810791126316002012").unwrap();
    let msg = new_end(
        [0x02, 0xB0, 0xD1, 0xC6],
        [
            with_end_dialogue_response(
                acn::SHORT_MSG_GATEWAY,
                acn::VERSION2,
                associate_result::ACCEPTED,
                SourceDiagnostic::DialogueServiceUser(diagnostic_user::NULL),
            ),
            with_end_return_result_last(0, Some(45), Some(parameter)),
        ],
    )
    .unwrap();

    let expected = hex::decode(
        "6455490402b0d1c66b2a2828060700118605010101a01d611b80020780a109060704000001001402a203020100a305a1030201006c21a21f020100301a02012d3015040806031128951337f4a009810791126316002012",
    )
    .unwrap();
    assert_eq!(msg.marshal().unwrap(), expected);
}

#[test]
fn unidirectional_messages_are_symmetric() {
    // No live capture available; the codec must at least be its own
    // inverse, with the bare SEQUENCE component container.
    let msg = tcap::new_unidirectional([
        tcap::with_unidirectional_dialogue(acn::SHORT_MSG_ALERT, acn::VERSION1),
        tcap::with_unidirectional_invoke(0, 64, Some(vec![0x04, 0x01, 0x42])),
    ])
    .unwrap();

    let wire = msg.marshal().unwrap();
    assert_eq!(wire[0], 0x61);
    let parsed = Tcap::parse_der(&wire).unwrap();
    assert_eq!(parsed, msg);
    assert_eq!(parsed.marshal().unwrap(), wire);
}
