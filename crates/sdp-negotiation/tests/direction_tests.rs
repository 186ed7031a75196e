// Direction table properties (RFC 3264 section 6.1)

use proptest::prelude::*;

use rvoip_sdp_negotiation::direction::negotiate_direction;
use rvoip_sdp_negotiation::MediaDirection;

fn sends(d: MediaDirection) -> bool {
    matches!(d, MediaDirection::SendRecv | MediaDirection::SendOnly)
}

fn receives(d: MediaDirection) -> bool {
    matches!(d, MediaDirection::SendRecv | MediaDirection::RecvOnly)
}

fn direction() -> impl Strategy<Value = MediaDirection> {
    prop::sample::select(MediaDirection::ALL.to_vec())
}

#[test]
fn test_full_table() {
    use MediaDirection::{Inactive as IN, RecvOnly as RO, SendOnly as SO, SendRecv as SR};

    // (remote, held, [support SR, SO, RO, IN])
    let expected = [
        (SR, false, [SR, SO, RO, IN]),
        (SR, true, [SO, SO, IN, IN]),
        (SO, false, [RO, IN, RO, IN]),
        (SO, true, [IN, IN, IN, IN]),
        (RO, false, [SO, SO, IN, IN]),
        (RO, true, [SO, SO, IN, IN]),
        (IN, false, [IN, IN, IN, IN]),
        (IN, true, [IN, IN, IN, IN]),
    ];
    for (remote, held, row) in expected {
        for (support, want) in [SR, SO, RO, IN].into_iter().zip(row) {
            assert_eq!(
                negotiate_direction(remote, support, held),
                want,
                "remote {} support {} held {}",
                remote,
                support,
                held
            );
        }
    }
}

proptest! {
    #[test]
    fn prop_never_sends_more_than_allowed(
        remote in direction(),
        support in direction(),
        held in any::<bool>(),
    ) {
        let answer = negotiate_direction(remote, support, held);
        if sends(answer) {
            prop_assert!(sends(support));
            prop_assert!(receives(remote));
        }
        if receives(answer) {
            prop_assert!(receives(support));
            prop_assert!(sends(remote));
            prop_assert!(!held);
        }
    }

    #[test]
    fn prop_inactive_remote_is_always_inactive(support in direction(), held in any::<bool>()) {
        prop_assert_eq!(
            negotiate_direction(MediaDirection::Inactive, support, held),
            MediaDirection::Inactive
        );
    }
}
