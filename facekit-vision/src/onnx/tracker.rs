use crate::types::BoundingBox;

/// Carries face ids across consecutive frames by greedy IoU matching.
#[derive(Debug, Clone)]
pub struct IouTracker {
    iou_threshold: f32,
    next_id: u32,
    tracks: Vec<(u32, BoundingBox)>,
}

impl IouTracker {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            next_id: 0,
            tracks: Vec::new(),
        }
    }

    /// Ids for `boxes`, in order. A box overlapping a previous-frame box by
    /// at least the threshold inherits its id; others get a fresh one.
    pub fn assign(&mut self, boxes: &[BoundingBox]) -> Vec<u32> {
        let mut claimed = vec![false; self.tracks.len()];
        let mut ids = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed[*i])
                .map(|(i, (_, prev))| (i, prev.iou(bbox)))
                .filter(|(_, iou)| *iou >= self.iou_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));

            let id = match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    self.tracks[i].0
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            ids.push(id);
        }

        self.tracks = ids.iter().copied().zip(boxes.iter().copied()).collect();
        ids
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}
